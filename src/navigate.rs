//! Navigation targets and the seam through which the session layer moves
//! the user between pages.

/// Application entry page. Failed or empty callbacks land here.
pub const ENTRY_ROUTE: &str = "/";

/// Authenticated landing page, shown after a successful sign-in.
pub const LANDING_ROUTE: &str = "/dashboard";

/// Receives navigation requests. In a browser this sets `window.location`;
/// the CLI prints the target instead.
pub trait Navigator: Send + Sync {
    fn navigate(&self, target: &str);
}
