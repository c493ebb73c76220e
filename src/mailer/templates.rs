//! Rendered message bodies for the authentication flows.
//!
//! Plain-text renderings; subjects and expiry wording match what the web
//! client tells users to expect.

use super::EmailMessage;

/// Verification email sent at registration and on resend. Carries both the
/// six-digit code and the fallback verification link; the two secrets are
/// issued together and expire independently.
pub fn verification_email(brand: &str, name: &str, code: &str, verify_url: &str) -> EmailMessage {
    EmailMessage {
        subject: format!("Verify Your Email - {brand}"),
        body: format!(
            "Hi {name},\n\n\
             Welcome to {brand}! Enter this verification code to confirm your email address:\n\n\
                 {code}\n\n\
             Or confirm directly through this link:\n\n\
                 {verify_url}\n\n\
             The code expires in 10 minutes; the link stays valid for 24 hours.\n\n\
             If you didn't create a {brand} account, you can safely ignore this email.\n"
        ),
    }
}

/// Password-reset email with the single-use reset link.
pub fn password_reset_email(brand: &str, name: &str, reset_url: &str) -> EmailMessage {
    EmailMessage {
        subject: format!("Password Reset - {brand}"),
        body: format!(
            "Hi {name},\n\n\
             We received a request to reset your {brand} password. Use this link to choose a new one:\n\n\
                 {reset_url}\n\n\
             The link expires in 10 minutes and can be used once.\n\n\
             If you didn't request a reset, your password is unchanged and no action is needed.\n"
        ),
    }
}
