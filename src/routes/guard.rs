//! Route guard
//!
//! Decides whether a view renders, shows a placeholder or redirects:
//! - loading: placeholder for anything that needs the identity
//! - unauthenticated on a protected route: login, remembering the location
//! - signed in without the admin flag on an admin route: home
//! - signed in on login/register: back to the remembered location

use super::{Access, Route};
use crate::config::AuthConfig;
use crate::session::AuthSnapshot;

/// Outcome of a guard check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Identity not known yet; render a placeholder
    Loading,
    /// Render the view
    Render(Route),
    /// Navigate elsewhere. `from` is the location to return to after login.
    Redirect { to: String, from: Option<String> },
}

/// Route guard configured with the login and home locations
#[derive(Debug, Clone)]
pub struct RouteGuard {
    login_path: String,
    home_path: String,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new(&AuthConfig::default())
    }
}

impl RouteGuard {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            login_path: config.login_path.clone(),
            home_path: config.home_path.clone(),
        }
    }

    /// Check a location against the snapshot
    pub fn check(&self, snapshot: &AuthSnapshot, location: &str) -> GuardDecision {
        self.check_with_from(snapshot, location, None)
    }

    /// Check a location, carrying the remembered `from` location (for login/register)
    pub fn check_with_from(
        &self,
        snapshot: &AuthSnapshot,
        location: &str,
        from: Option<&str>,
    ) -> GuardDecision {
        let route = Route::resolve(location);

        match route.access() {
            Access::Public => GuardDecision::Render(route),
            _ if snapshot.is_loading => GuardDecision::Loading,
            Access::GuestOnly => {
                if snapshot.is_authenticated() {
                    let remembered = from.map(str::to_string).or_else(|| from_query(location));
                    GuardDecision::Redirect {
                        to: self.post_login_target(remembered.as_deref()),
                        from: None,
                    }
                } else {
                    GuardDecision::Render(route)
                }
            }
            Access::Authenticated | Access::Admin if !snapshot.is_authenticated() => {
                tracing::debug!("Unauthenticated access to {}, redirecting to login", location);
                GuardDecision::Redirect {
                    to: self.login_path.clone(),
                    from: Some(location.to_string()),
                }
            }
            Access::Admin if !snapshot.is_admin => {
                tracing::debug!("Non-admin access to {}, redirecting home", location);
                GuardDecision::Redirect {
                    to: self.home_path.clone(),
                    from: None,
                }
            }
            Access::Authenticated | Access::Admin => GuardDecision::Render(route),
        }
    }

    /// Where to go after signing in.
    ///
    /// The remembered location is used when it is a local absolute path that
    /// doesn't point back at login or register; otherwise home.
    pub fn post_login_target(&self, from: Option<&str>) -> String {
        match from {
            Some(path) if is_local_path(path) && !self.is_auth_page(path) => path.to_string(),
            _ => self.home_path.clone(),
        }
    }

    fn is_auth_page(&self, location: &str) -> bool {
        let path = location
            .split(|c| c == '?' || c == '#')
            .next()
            .unwrap_or_default()
            .trim_end_matches('/');
        path == self.login_path.trim_end_matches('/')
            || matches!(Route::resolve(location), Route::Login | Route::Register)
    }
}

/// A path on this site: a single leading slash and no scheme
fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}

/// `from` query parameter of a location, decoded
fn from_query(location: &str) -> Option<String> {
    let query = location.split_once('?')?.1;
    let query = query.split('#').next().unwrap_or_default();
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "from")
        .and_then(|(_, value)| urlencoding::decode(value).ok())
        .map(|value| value.into_owned())
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn protected_path_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("/checklist".to_string()),
            Just("/chat".to_string()),
            Just("/profile".to_string()),
            Just("/admin".to_string()),
            (1i64..10_000).prop_map(|id| format!("/hero/{}/edit", id)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// A loading snapshot never produces a redirect for protected routes.
        #[test]
        fn property_loading_never_redirects(path in protected_path_strategy(), admin in any::<bool>()) {
            let guard = RouteGuard::default();
            let mut snapshot = AuthSnapshot::loading();
            snapshot.is_admin = admin;
            prop_assert_eq!(guard.check(&snapshot, &path), GuardDecision::Loading);
        }

        /// Signed-out visitors are always sent to login with their location remembered.
        #[test]
        fn property_signed_out_remembers_location(path in protected_path_strategy()) {
            let guard = RouteGuard::default();
            let decision = guard.check(&AuthSnapshot::default(), &path);
            prop_assert_eq!(decision, GuardDecision::Redirect {
                to: "/login".to_string(),
                from: Some(path.clone()),
            });
            prop_assert_eq!(guard.post_login_target(Some(path.as_str())), path);
        }

        /// Post-login targets are always local paths.
        #[test]
        fn property_post_login_target_is_local(from in ".{0,40}") {
            let guard = RouteGuard::default();
            let target = guard.post_login_target(Some(from.as_str()));
            prop_assert!(target.starts_with('/'));
            prop_assert!(!target.starts_with("//"));
        }
    }
}
