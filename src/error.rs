use std::fmt::Display;

/// Reports an error that is not worth propagating and continues without it.
pub trait ResultOkLogExt<T> {
    /// Logs the error at error level and discards it.
    fn ok_log(self) -> Option<T>;

    /// Like [`ok_log`](ResultOkLogExt::ok_log), prefixing the message with `context`.
    fn ok_log_context(self, context: &str) -> Option<T>;
}

impl<T, E: Display> ResultOkLogExt<T> for Result<T, E> {
    fn ok_log(self) -> Option<T> {
        self.map_err(|err| log::error!("{err}")).ok()
    }

    fn ok_log_context(self, context: &str) -> Option<T> {
        self.map_err(|err| log::error!("{context}: {err}")).ok()
    }
}
