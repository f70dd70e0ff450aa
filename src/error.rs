//! Helpers for errors that are reported but not propagated.

pub trait ResultOkLogExt<T, E> {
    /// Logs the error at `error` level and discards it.
    fn ok_log(self) -> Option<T>;

    /// Like [`ok_log`](Self::ok_log), prefixing the message with `context`.
    fn ok_log_context(self, context: impl FnOnce() -> String) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_log(self) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::error!("{err}");
                None
            }
        }
    }

    fn ok_log_context(self, context: impl FnOnce() -> String) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::error!("{}: {err}", context());
                None
            }
        }
    }
}
