// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account lifecycle: registration, two-step login and password reset.

use chrono::Duration;

use super::CloudService;
use crate::error::{CloudError, CloudResult};
use crate::models::{LoginChallenge, Session};
use crate::monitor::{ActivityAction, AlertDispatcher};
use crate::storage::repository::otp::OtpRepository;
use crate::storage::repository::users::{
    normalize_email, LoginCheck, UserProfile, UserRepository, LOCKOUT_MINUTES,
};

/// Lifetime of a session token.
pub const SESSION_TTL_HOURS: i64 = 2;

impl CloudService {
    /// Create an account. Returns the normalized email.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        profile: UserProfile,
    ) -> CloudResult<String> {
        UserRepository::new(&self.state)
            .register(email, password, profile)
            .await
    }

    /// First login step: check the password and send a one-time code.
    pub async fn login(&self, email: &str, password: &str) -> CloudResult<LoginChallenge> {
        let email = normalize_email(email)?;
        let now = self.state.clock.now();

        match UserRepository::new(&self.state)
            .check_credentials(&email, password)
            .await?
        {
            LoginCheck::Verified => {}
            LoginCheck::Rejected { attempts } => {
                self.track(&email, ActivityAction::FailedLogin, None).await;
                tracing::info!(attempts, "login rejected");
                return Err(CloudError::unauthorized("invalid credentials"));
            }
            LoginCheck::LockedOut {
                until,
                newly_locked,
            } => {
                if newly_locked {
                    self.track(&email, ActivityAction::FailedLogin, None).await;
                    AlertDispatcher::new(&self.state).notify_security(
                        &email,
                        &format!(
                            "Your account has been locked for {LOCKOUT_MINUTES} minutes due to repeated failed login attempts."
                        ),
                    );
                    tracing::warn!(%until, "account locked");
                }
                return Err(CloudError::AccountLocked {
                    until,
                    minutes_left: (until - now).num_minutes(),
                });
            }
        }

        self.track(&email, ActivityAction::LoginSuccess, None).await;
        let otp_sent = self.send_otp(&email, "Your OTP Code").await?;
        Ok(LoginChallenge { email, otp_sent })
    }

    /// Second login step: exchange a live one-time code for a session.
    pub async fn verify_otp(&self, email: &str, code: &str) -> CloudResult<Session> {
        let email = normalize_email(email)?;
        if !OtpRepository::new(&self.state).consume(&email, code).await? {
            return Err(CloudError::unauthorized("invalid or expired OTP"));
        }

        let ttl = Duration::hours(SESSION_TTL_HOURS);
        let token = self.state.tokens.issue(&email, ttl)?;
        self.audit_now(&email, "login", "").await;

        Ok(Session {
            expires_at: self.state.clock.now() + ttl,
            email,
            token,
        })
    }

    /// Resolve a session token to the user's email.
    pub async fn authenticate(&self, token: &str) -> CloudResult<String> {
        let email = self.state.tokens.verify(token)?;
        if !UserRepository::new(&self.state).exists(&email).await {
            return Err(CloudError::unauthorized("unknown user"));
        }
        Ok(email)
    }

    pub async fn logout(&self, user: &str) {
        self.audit_now(user, "logout", "").await;
    }

    /// Send a password reset code to a registered email.
    pub async fn forgot_password(&self, email: &str) -> CloudResult<()> {
        let email = normalize_email(email)?;
        if !UserRepository::new(&self.state).exists(&email).await {
            return Err(CloudError::validation("email is not registered"));
        }
        self.send_otp(&email, "Password Reset OTP").await?;
        Ok(())
    }

    /// Set a new password with a code from [`CloudService::forgot_password`].
    pub async fn reset_password(&self, email: &str, code: &str, new_password: &str) -> CloudResult<()> {
        let email = normalize_email(email)?;
        if new_password.is_empty() {
            return Err(CloudError::validation("password is required"));
        }
        if !OtpRepository::new(&self.state).consume(&email, code).await? {
            return Err(CloudError::unauthorized("invalid or expired OTP"));
        }
        UserRepository::new(&self.state)
            .set_password(&email, new_password)
            .await?;
        tracing::info!("password reset");
        Ok(())
    }

    async fn send_otp(&self, email: &str, subject: &str) -> CloudResult<bool> {
        let code = OtpRepository::new(&self.state).issue(email).await?;
        let minutes = self.state.config.otp_expiry.num_minutes().max(1);
        let body = format!("Your OTP code is: {code}\n\nValid for {minutes} minutes.");
        let sent = self.state.notifier.send(email, subject, &body);
        if !sent {
            tracing::warn!("one-time code could not be delivered");
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{ActivityLog, ALERT_SUBJECT};
    use crate::service::test_support::harness;
    use crate::storage::AccessLog;

    fn otp_from(body: &str) -> String {
        body.chars().filter(char::is_ascii_digit).take(6).collect()
    }

    #[tokio::test]
    async fn login_flow_issues_session() {
        let h = harness();
        h.register(" Alice@X.com ", "pw").await;

        let challenge = h.service.login("alice@x.com", "pw").await.unwrap();
        assert_eq!(challenge.email, "alice@x.com");
        assert!(challenge.otp_sent);

        let mail = h.ctx.sink.sent_to("alice@x.com");
        assert_eq!(mail[0].subject, "Your OTP Code");
        assert!(mail[0].body.contains("Valid for 3 minutes"));
        let code = otp_from(&mail[0].body);

        let session = h.service.verify_otp("alice@x.com", &code).await.unwrap();
        assert_eq!(
            h.service.authenticate(&session.token).await.unwrap(),
            "alice@x.com"
        );
        // Codes work once.
        assert!(matches!(
            h.service.verify_otp("alice@x.com", &code).await,
            Err(CloudError::Unauthorized(_))
        ));

        let access = AccessLog::new(&h.ctx.state).entries().await;
        assert_eq!(access.last().unwrap().action, "login");
        let activity = ActivityLog::new(&h.ctx.state).entries().await;
        assert_eq!(activity[0].action, ActivityAction::LoginSuccess);
    }

    #[tokio::test]
    async fn expired_otp_is_rejected() {
        let h = harness();
        h.register("alice@x.com", "pw").await;
        h.service.login("alice@x.com", "pw").await.unwrap();
        let code = otp_from(&h.ctx.sink.sent()[0].body);

        h.ctx.clock.advance(Duration::seconds(181));
        assert!(h.service.verify_otp("alice@x.com", &code).await.is_err());
    }

    #[tokio::test]
    async fn lockout_after_five_failures() {
        let h = harness();
        h.register("alice@x.com", "pw").await;

        for _ in 0..4 {
            assert!(matches!(
                h.service.login("alice@x.com", "nope").await,
                Err(CloudError::Unauthorized(_))
            ));
        }
        let locked = h.service.login("alice@x.com", "nope").await.unwrap_err();
        assert!(matches!(
            locked,
            CloudError::AccountLocked {
                minutes_left: 15,
                ..
            }
        ));
        let alerts: Vec<_> = h
            .ctx
            .sink
            .sent()
            .into_iter()
            .filter(|n| n.subject == ALERT_SUBJECT)
            .collect();
        assert_eq!(alerts.len(), 1);

        // Even the right password is refused while locked.
        h.ctx.clock.advance(Duration::minutes(5));
        assert!(matches!(
            h.service.login("alice@x.com", "pw").await,
            Err(CloudError::AccountLocked {
                minutes_left: 10,
                ..
            })
        ));

        h.ctx.clock.advance(Duration::minutes(11));
        h.service.login("alice@x.com", "pw").await.unwrap();

        let failed = ActivityLog::new(&h.ctx.state)
            .entries()
            .await
            .into_iter()
            .filter(|e| e.action == ActivityAction::FailedLogin)
            .count();
        assert_eq!(failed, 5);
    }

    #[tokio::test]
    async fn unknown_user_is_unauthorized_and_tracked() {
        let h = harness();
        assert!(matches!(
            h.service.login("ghost@x.com", "pw").await,
            Err(CloudError::Unauthorized(_))
        ));
        let activity = ActivityLog::new(&h.ctx.state).entries().await;
        assert_eq!(activity[0].user, "ghost@x.com");
    }

    #[tokio::test]
    async fn password_reset() {
        let h = harness();
        h.register("alice@x.com", "old").await;

        assert!(matches!(
            h.service.forgot_password("bob@x.com").await,
            Err(CloudError::Validation(_))
        ));
        h.service.forgot_password("alice@x.com").await.unwrap();
        let mail = &h.ctx.sink.sent()[0];
        assert_eq!(mail.subject, "Password Reset OTP");
        let code = otp_from(&mail.body);

        assert!(h
            .service
            .reset_password("alice@x.com", "000000x", "new")
            .await
            .is_err());
        h.service
            .reset_password("alice@x.com", &code, "new")
            .await
            .unwrap();

        assert!(h.service.login("alice@x.com", "old").await.is_err());
        h.service.login("alice@x.com", "new").await.unwrap();
    }

    #[tokio::test]
    async fn bad_tokens_are_unauthorized() {
        let h = harness();
        assert!(matches!(
            h.service.authenticate("not-a-token").await,
            Err(CloudError::Unauthorized(_))
        ));
    }
}
