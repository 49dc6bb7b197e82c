use std::error::Error;
use std::fmt;

/// Returns `true` if backtrace printing is enabled.
///
/// # Example
///
/// ```
/// # unsafe { std::env::set_var("RUST_BACKTRACE", "full") };
/// assert!(beacon_log::backtrace_enabled());
/// ```
pub fn backtrace_enabled() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_ref().map(String::as_str),
        Ok("1") | Ok("full")
    )
}

/// A wrapper around an [`Error`] that prints its causes.
///
/// # Example
///
/// ```
/// use beacon_log::LogError;
///
/// if let Err(error) = std::env::var("FOO") {
///     beacon_log::error!("env failed: {}", LogError(&error));
/// }
/// ```
pub struct LogError<'a, E: Error + ?Sized>(pub &'a E);

impl<E: Error + ?Sized> fmt::Display for LogError<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;

        let mut source = self.0.source();
        while let Some(s) = source {
            write!(f, "\n  caused by: {s}")?;
            source = s.source();
        }

        Ok(())
    }
}

/// A wrapper around an [`Error`] that prints its causes only if the flag is set.
///
/// With the flag, this formats like [`LogError`]. Without it, only the outermost error is printed.
///
/// # Example
///
/// ```
/// use beacon_log::ErrorChain;
///
/// let debug = true;
/// if let Err(error) = std::env::var("FOO") {
///     let chain = ErrorChain(&error, debug);
///     beacon_log::error!("env failed: {}", chain);
/// }
/// ```
pub struct ErrorChain<'a, E: Error + ?Sized>(pub &'a E, pub bool);

impl<E: Error + ?Sized> fmt::Display for ErrorChain<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.1 {
            fmt::Display::fmt(&LogError(self.0), f)
        } else {
            write!(f, "{}", self.0)
        }
    }
}
