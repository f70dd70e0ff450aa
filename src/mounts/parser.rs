//! Mount table line parser.
//!
//! Parses lines in `/proc/mounts` format, see
//! [`fstab(5)`](https://man7.org/linux/man-pages/man5/fstab.5.html):
//!
//! ```text
//! cgroup /sys/fs/cgroup/memory cgroup rw,nosuid,nodev,noexec,relatime,memory 0 0
//! ```

/// Number of whitespace separated fields on every mount table line.
const FIELD_COUNT: usize = 6;

/// Represents a parsed mount table line.
#[derive(Debug, PartialEq, Eq)]
pub struct MountEntry<'a> {
    /// Mounted device or pseudo filesystem name.
    pub source: &'a str,
    /// Mount point on the host.
    pub mount_point: &'a str,
    /// Filesystem type (e.g., `cgroup`, `ext4`).
    pub fs_type: &'a str,
    /// Comma separated mount options. For cgroup v1 these include the controllers.
    pub options: &'a str,
    pub dump_freq: &'a str,
    pub pass_no: &'a str,
}

impl MountEntry<'_> {
    /// Returns true if the comma separated options contain `option` verbatim.
    pub fn has_option(&self, option: &str) -> bool {
        self.options.split(',').any(|opt| opt == option)
    }
}

/// Named fields in a mount table line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountField {
    Source,
    MountPoint,
    FsType,
    Options,
    DumpFreq,
    PassNo,
}

impl MountField {
    const ORDER: [MountField; FIELD_COUNT] = [
        MountField::Source,
        MountField::MountPoint,
        MountField::FsType,
        MountField::Options,
        MountField::DumpFreq,
        MountField::PassNo,
    ];
}

impl std::fmt::Display for MountField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MountField::Source => "source",
            MountField::MountPoint => "mount_point",
            MountField::FsType => "fs_type",
            MountField::Options => "options",
            MountField::DumpFreq => "dump_freq",
            MountField::PassNo => "pass_no",
        };
        write!(f, "{name}")
    }
}

/// Errors that may occur when parsing a mount table line.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("missing `{field}` in line: `{line}`")]
    MissingField { field: MountField, line: String },
    #[error("unexpected trailing field in line: `{0}`")]
    TrailingField(String),
}

/// Parses a single line of the mount table.
///
/// All six fields must be present; the returned entry borrows from `line`.
///
/// # Errors
///
/// Returns [`ParseError::MissingField`] naming the first absent field, or
/// [`ParseError::TrailingField`] if the line has more than six fields.
pub fn parse_mount_line(line: &str) -> Result<MountEntry<'_>, ParseError> {
    let mut fields = line.split_whitespace();
    let mut out = [""; FIELD_COUNT];
    for (slot, field) in out.iter_mut().zip(MountField::ORDER) {
        *slot = fields.next().ok_or_else(|| ParseError::MissingField {
            field,
            line: line.to_owned(),
        })?;
    }
    if fields.next().is_some() {
        return Err(ParseError::TrailingField(line.to_owned()));
    }

    let [source, mount_point, fs_type, options, dump_freq, pass_no] = out;
    Ok(MountEntry {
        source,
        mount_point,
        fs_type,
        options,
        dump_freq,
        pass_no,
    })
}
