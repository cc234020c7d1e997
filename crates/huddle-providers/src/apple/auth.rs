//! HTTP Basic authentication for iCloud app-specific passwords.

use base64::Engine;

/// Builds a Basic `Authorization` header value.
pub fn basic_auth(username: &str, password: &str) -> String {
    let credentials = format!("{}:{}", username, password);
    let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
    format!("Basic {}", encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_auth_encoding() {
        // base64("user:password") = "dXNlcjpwYXNzd29yZA=="
        assert_eq!(basic_auth("user", "password"), "Basic dXNlcjpwYXNzd29yZA==");
    }

    #[test]
    fn app_password_with_dashes() {
        assert_eq!(
            basic_auth("ada@icloud.com", "abcd-efgh-ijkl-mnop"),
            "Basic YWRhQGljbG91ZC5jb206YWJjZC1lZmdoLWlqa2wtbW5vcA=="
        );
    }
}
