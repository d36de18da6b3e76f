//! Terminal styling for CLI output
//!
//! Semantic colors on top of crossterm's `Stylize`:
//! - green/yellow/red for status
//! - cyan for headers and technical values

use crossterm::style::Stylize;

/// Semantic styling methods. Use these instead of raw color calls.
///
/// ```
/// use crossterm::style::Stylize;
/// use pa_applet::style::AppletStyle;
///
/// println!("{}", "Volume".header());
/// println!("{}", "Running".success());
/// ```
pub trait AppletStyle: Stylize {
    /// Section headers (cyan bold)
    fn header(self) -> <<Self as Stylize>::Styled as Stylize>::Styled
    where
        Self: Sized,
        <Self as Stylize>::Styled: Stylize,
    {
        self.cyan().bold()
    }

    /// Positive states: "Running", "ready", active profile marker
    fn success(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.green()
    }

    /// Problems: "Not running", errors
    fn error(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.red()
    }

    /// Partial states: reconnecting, muted
    fn warning(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.yellow()
    }

    /// Identifiers, paths, counts
    fn technical(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.cyan()
    }
}

impl<T: Stylize> AppletStyle for T {}
