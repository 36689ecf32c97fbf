//! Page-level side effects the client asks its host to perform.

use url::Url;

/// A page the host should navigate to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// No identity is available; show the login page.
    Login(String),
    /// The user must complete registration first.
    Registration(String),
}

impl Redirect {
    /// The target location.
    #[must_use]
    pub fn location(&self) -> &str {
        match self {
            Self::Login(location) | Self::Registration(location) => location,
        }
    }
}

/// Host page integration: navigation, address rewriting and blocking alerts.
pub trait Navigator {
    /// Navigate away from the current page.
    fn redirect(&self, target: &Redirect);

    /// Rewrite the address bar without navigating.
    fn replace_location(&self, url: &Url);

    /// Show a blocking alert for an unrecoverable situation.
    fn alert(&self, message: &str);
}
