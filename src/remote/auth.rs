use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    /// `Cookie` header value, as `name=value; name2=value2`.
    pub cookie: Option<String>,
    /// User record returned by login; its presence means "logged in".
    pub user: Option<serde_json::Value>,
}

/// Shared login state. Cloning shares the same session.
#[derive(Debug, Clone, Default)]
pub struct Session {
    inner: Arc<Mutex<SessionData>>,
}

impl Session {
    pub fn new(data: SessionData) -> Self {
        Self {
            inner: Arc::new(Mutex::new(data)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionData> {
        // A poisoned lock still holds a usable cookie string.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_logged_in(&self) -> bool {
        self.lock().user.is_some()
    }

    pub fn cookie_header(&self) -> Option<String> {
        self.lock().cookie.clone().filter(|c| !c.is_empty())
    }

    pub fn snapshot(&self) -> SessionData {
        self.lock().clone()
    }

    pub fn set_user(&self, user: serde_json::Value) {
        self.lock().user = Some(user);
    }

    /// Merge `Set-Cookie` values into the stored cookie header.
    pub fn absorb_set_cookie<'a>(&self, values: impl IntoIterator<Item = &'a str>) {
        let mut data = self.lock();
        let merged = merge_set_cookie(data.cookie.as_deref(), values);
        if merged.is_some() {
            data.cookie = merged;
        }
    }

    pub fn clear(&self) {
        *self.lock() = SessionData::default();
    }
}

/// Fold `Set-Cookie` header values into an existing `Cookie` header.
///
/// Only the leading `name=value` pair of each header is kept; attributes such
/// as `Path` or `HttpOnly` are dropped. A cookie with the same name replaces
/// the old value in place. Returns `None` when nothing usable was given.
pub fn merge_set_cookie<'a>(
    existing: Option<&str>,
    values: impl IntoIterator<Item = &'a str>,
) -> Option<String> {
    let mut pairs: Vec<(String, String)> = existing
        .unwrap_or("")
        .split(';')
        .filter_map(split_pair)
        .collect();

    let mut changed = false;
    for raw in values {
        let Some((name, value)) = raw.split(';').next().and_then(split_pair) else {
            continue;
        };
        changed = true;
        match pairs.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => pairs.push((name, value)),
        }
    }

    if !changed {
        return None;
    }
    Some(
        pairs
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

fn split_pair(s: &str) -> Option<(String, String)> {
    let (name, value) = s.trim().split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_name_value_only() {
        let out = merge_set_cookie(None, ["session=abc; Path=/; HttpOnly"]);
        assert_eq!(out.as_deref(), Some("session=abc"));
    }

    #[test]
    fn merge_replaces_by_name() {
        let out = merge_set_cookie(Some("session=old; theme=dark"), ["session=new; Path=/", "lang=en"]);
        assert_eq!(out.as_deref(), Some("session=new; theme=dark; lang=en"));
    }

    #[test]
    fn merge_ignores_garbage() {
        assert_eq!(merge_set_cookie(Some("a=1"), ["; Path=/", "noequals"]), None);
    }

    #[test]
    fn session_login_state() {
        let s = Session::default();
        assert!(!s.is_logged_in());
        s.absorb_set_cookie(["sid=1"]);
        assert!(!s.is_logged_in());
        assert_eq!(s.cookie_header().as_deref(), Some("sid=1"));

        s.set_user(serde_json::json!({"username": "u"}));
        assert!(s.clone().is_logged_in());

        s.clear();
        assert!(!s.is_logged_in());
        assert_eq!(s.cookie_header(), None);
    }
}
