#[derive(Debug, thiserror::Error)]
pub enum CgroupLineError {
    #[error("invalid cgroup line format: {0}")]
    InvalidFormat(String),
    #[error("invalid hierarchy id in cgroup line: {0}")]
    InvalidHierarchyID(String),
}

/// One line of `/proc/<pid>/cgroup`.
#[derive(Debug, PartialEq, Eq)]
pub struct CgroupLine<'a> {
    pub hierarchy_id: u32,
    /// Empty for the unified (v2) hierarchy.
    pub controller_list: Vec<&'a str>,
    pub cgroup_path: &'a str,
}

impl CgroupLine<'_> {
    pub fn has_controller(&self, controller: &str) -> bool {
        self.controller_list.iter().any(|c| *c == controller)
    }
}

/// Parses a `<hierarchy-id>:<controller-list>:<cgroup-path>` line.
///
/// The path is taken verbatim after the second colon, so paths containing colons survive.
pub fn parse_cgroup_line(line: &str) -> Result<CgroupLine<'_>, CgroupLineError> {
    let mut it = line.splitn(3, ':');
    let hierarchy_id = it
        .next()
        .ok_or_else(|| CgroupLineError::InvalidFormat(line.to_owned()))?
        .parse::<u32>()
        .map_err(|_| CgroupLineError::InvalidHierarchyID(line.to_owned()))?;
    let controller_list = it
        .next()
        .ok_or_else(|| CgroupLineError::InvalidFormat(line.to_owned()))?;
    let controller_list: Vec<&str> = if controller_list.is_empty() {
        Vec::default()
    } else {
        controller_list.split(',').collect()
    };
    let cgroup_path = it
        .next()
        .ok_or_else(|| CgroupLineError::InvalidFormat(line.to_owned()))?;

    Ok(CgroupLine {
        hierarchy_id,
        controller_list,
        cgroup_path: cgroup_path.trim(),
    })
}
