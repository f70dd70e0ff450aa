use std::sync::Arc;

use crate::container::ContainerID;

use super::{BoxFuture, Error, PidResolver, Result};

/// Tries several strategies in order.
///
/// The next strategy is only consulted when the previous one reports
/// [`Error::NotFound`]; any other failure, ambiguity included, ends the lookup.
#[derive(Clone, Default)]
pub struct ChainedResolver {
    strategies: Vec<Arc<dyn PidResolver>>,
}

impl ChainedResolver {
    pub fn new(strategies: Vec<Arc<dyn PidResolver>>) -> Self {
        Self { strategies }
    }
}

impl PidResolver for ChainedResolver {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn resolve<'a>(&'a self, id: &'a ContainerID) -> BoxFuture<'a, Result<u32>> {
        Box::pin(async move {
            for strategy in &self.strategies {
                match strategy.resolve(id).await {
                    Ok(pid) => {
                        log::debug!("{} resolver found pid {} for `{}`", strategy.name(), pid, id);
                        return Ok(pid);
                    }
                    Err(err) if err.is_not_found() => {
                        log::debug!("{} resolver: {}", strategy.name(), err);
                    }
                    Err(err) => return Err(err),
                }
            }

            Err(Error::NotFound { id: id.to_string() })
        })
    }
}
