// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use super::CloudService;
use crate::error::CloudResult;
use crate::monitor::ActivityAction;
use crate::storage::repository::files::DecryptedFile;
use crate::storage::repository::shares::{CreatedShare, ShareLink, ShareRepository, ShareRequest};
use crate::storage::AccessLogEntry;

impl CloudService {
    /// Share one of the owner's files. The returned password is shown to
    /// the owner once and never stored in plaintext.
    pub async fn share_file(&self, owner: &str, request: ShareRequest) -> CloudResult<CreatedShare> {
        let created = ShareRepository::new(&self.state)
            .create_share(owner, request)
            .await?;

        self.audit(
            AccessLogEntry::new(owner, "share_create", self.state.clock.now())
                .with_file(created.original_name.clone())
                .with_receivers(created.recipients.clone()),
        )
        .await;
        self.track(owner, ActivityAction::Share, Some(&created.original_name))
            .await;
        Ok(created)
    }

    /// Download through a share link. Activity is recorded against the
    /// owner of the file.
    pub async fn redeem_share(&self, token: &str, password: &str) -> CloudResult<DecryptedFile> {
        let (share, file) = ShareRepository::new(&self.state)
            .redeem_share(token, password)
            .await?;
        self.track(
            &share.owner,
            ActivityAction::SharedDownload,
            Some(&share.original_name),
        )
        .await;
        Ok(file)
    }

    pub async fn list_shares(&self, owner: &str) -> Vec<ShareLink> {
        ShareRepository::new(&self.state).list(owner).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::error::CloudError;
    use crate::monitor::ActivityLog;
    use crate::service::test_support::harness;
    use crate::storage::repository::shares::ShareIndex;
    use crate::storage::{AccessLog, Collection};
    use chrono::Duration;

    #[tokio::test]
    async fn alice_shares_with_bob() {
        let h = harness();
        h.service
            .upload("alice@x.com", "doc.pdf", "/", b"%PDF-1.7 quarterly numbers")
            .await
            .unwrap();

        let mut request = ShareRequest::new("doc.pdf", vec!["bob@x.com".into()]);
        request.ttl_seconds = 3600;
        request.password = Some("pw1".into());
        let share = h.service.share_file("alice@x.com", request).await.unwrap();

        let mail = h.ctx.sink.sent_to("bob@x.com");
        assert_eq!(mail.len(), 1);
        assert!(mail[0].body.contains(&share.link));
        assert!(!mail[0].body.contains("pw1"));

        let file = h.service.redeem_share(&share.token, "pw1").await.unwrap();
        assert_eq!(file.original_name, "doc.pdf");
        assert_eq!(file.content.as_slice(), b"%PDF-1.7 quarterly numbers");

        assert!(matches!(
            h.service.redeem_share(&share.token, "wrong").await,
            Err(CloudError::Unauthorized(_))
        ));

        let past = h.ctx.clock.now() - Duration::seconds(1);
        h.ctx
            .state
            .collections
            .update(Collection::Shares, |shares: &mut ShareIndex| {
                if let Some(link) = shares.get_mut(&share.token) {
                    link.expires_at = past;
                }
                Ok(())
            })
            .await
            .unwrap();
        assert!(matches!(
            h.service.redeem_share(&share.token, "pw1").await,
            Err(CloudError::Expired(_))
        ));

        let access = AccessLog::new(&h.ctx.state).entries().await;
        let created = access.iter().find(|e| e.action == "share_create").unwrap();
        assert_eq!(created.receiver_emails(), ["bob@x.com".to_string()]);

        let shared_downloads: Vec<_> = ActivityLog::new(&h.ctx.state)
            .entries()
            .await
            .into_iter()
            .filter(|e| e.action == ActivityAction::SharedDownload)
            .collect();
        assert_eq!(shared_downloads.len(), 1);
        assert_eq!(shared_downloads[0].user, "alice@x.com");
    }

    #[tokio::test]
    async fn expiry_beats_bad_password() {
        let h = harness();
        h.service
            .upload("alice@x.com", "a.txt", "/", b"a")
            .await
            .unwrap();
        let mut request = ShareRequest::new("a.txt", vec!["bob@x.com".into()]);
        request.ttl_seconds = 1;
        request.password = Some("pw".into());
        let share = h.service.share_file("alice@x.com", request).await.unwrap();

        h.ctx.clock.advance(Duration::seconds(2));
        assert!(matches!(
            h.service.redeem_share(&share.token, "pw").await,
            Err(CloudError::Expired(_))
        ));
        assert!(matches!(
            h.service.redeem_share(&share.token, "bad").await,
            Err(CloudError::Expired(_))
        ));
    }

    #[tokio::test]
    async fn list_shares_by_owner() {
        let h = harness();
        h.service
            .upload("alice@x.com", "a.txt", "/", b"a")
            .await
            .unwrap();
        h.service
            .share_file(
                "alice@x.com",
                ShareRequest::new("a.txt", vec!["bob@x.com".into()]),
            )
            .await
            .unwrap();

        assert_eq!(h.service.list_shares("alice@x.com").await.len(), 1);
        assert!(h.service.list_shares("bob@x.com").await.is_empty());
    }
}
