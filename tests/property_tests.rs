//! Property-based tests for credential types.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated inputs.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use bbkt::auth::{mask, parse_scopes, Capability, Credential, Grant, OAuthGrant, ScopePolicy};

/// Strategy for timestamps within a few decades of the epoch offset.
fn timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (1_500_000_000i64..2_500_000_000i64).prop_map(|secs| {
        Utc.timestamp_opt(secs, 0)
            .single()
            .unwrap_or_else(Utc::now)
    })
}

/// Strategy for scope tokens.
fn scope_token() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("repository".to_string()),
        Just("repository:write".to_string()),
        Just("pullrequest".to_string()),
        Just("pullrequest:write".to_string()),
        Just("pipeline".to_string()),
        Just("issue:write".to_string()),
        Just("read:repository:bitbucket".to_string()),
        "[a-z]{1,12}(:[a-z]{1,8})?",
    ]
}

fn oauth(created_at: DateTime<Utc>, expires_in_secs: u64) -> Credential {
    Credential {
        created_at,
        grant: Grant::OAuth(OAuthGrant {
            access_token: "access".into(),
            refresh_token: Some("refresh".into()),
            token_type: "bearer".into(),
            expires_in_secs,
            granted_scopes: BTreeSet::new(),
            client_id: "id".into(),
            client_secret: "secret".into(),
        }),
    }
}

proptest! {
    /// Once expired, a credential stays expired as time moves forward.
    #[test]
    fn expiry_is_monotonic_in_time(
        created in timestamp(),
        lifetime in 0u64..200_000,
        buffer_secs in 0i64..3_600,
        offset in 0i64..400_000,
        later in 0i64..400_000,
    ) {
        let credential = oauth(created, lifetime);
        let buffer = Duration::seconds(buffer_secs);
        let now = created + Duration::seconds(offset);

        if credential.is_expired(now, buffer) {
            prop_assert!(credential.is_expired(now + Duration::seconds(later), buffer));
        }
    }

    /// A larger buffer never makes an expired credential valid again.
    #[test]
    fn expiry_is_monotonic_in_buffer(
        created in timestamp(),
        lifetime in 0u64..200_000,
        small in 0i64..3_600,
        extra in 0i64..3_600,
        offset in 0i64..400_000,
    ) {
        let credential = oauth(created, lifetime);
        let now = created + Duration::seconds(offset);

        if credential.is_expired(now, Duration::seconds(small)) {
            prop_assert!(credential.is_expired(now, Duration::seconds(small + extra)));
        }
    }

    /// Expiry matches `now + buffer >= created_at + lifetime`.
    #[test]
    fn expiry_matches_boundary(
        created in timestamp(),
        lifetime in 0u64..200_000,
        buffer_secs in 0i64..3_600,
        offset in -1_000i64..400_000,
    ) {
        let credential = oauth(created, lifetime);
        let buffer = Duration::seconds(buffer_secs);
        let now = created + Duration::seconds(offset);
        let expected = now + buffer >= created + Duration::seconds(lifetime as i64);

        prop_assert_eq!(credential.is_expired(now, buffer), expected);
    }

    /// Static credentials never expire.
    #[test]
    fn static_credentials_never_expire(
        offset in 0i64..10_000_000,
        buffer_secs in 0i64..100_000,
    ) {
        let credential = Credential::new_static("dev@example.com", "token");
        let now = credential.created_at + Duration::seconds(offset);
        prop_assert!(!credential.is_expired(now, Duration::seconds(buffer_secs)));
        prop_assert!(credential.expires_at().is_none());
    }

    /// Masking never reveals a short secret and never echoes a long one whole.
    #[test]
    fn mask_never_reveals_secret(secret in "[A-Za-z0-9_\\-]{0,64}") {
        let masked = mask(&secret);
        if secret.len() >= 9 {
            prop_assert!(!masked.contains(&secret));
            prop_assert!(masked.starts_with(&secret[..4]));
            prop_assert!(masked.ends_with(&secret[secret.len() - 4..]));
        } else {
            prop_assert!(secret.is_empty() || !masked.contains(&secret));
        }
    }

    /// Parsed scope sets contain no empty entries or separators.
    #[test]
    fn parsed_scopes_are_clean(tokens in prop::collection::vec(scope_token(), 0..8)) {
        let raw = tokens.join(", ");
        let parsed = parse_scopes(&raw);

        prop_assert!(parsed.iter().all(|s| !s.is_empty()));
        prop_assert!(parsed.iter().all(|s| !s.contains(',') && !s.contains(' ')));
        let expected: BTreeSet<String> = tokens.into_iter().collect();
        prop_assert_eq!(parsed, expected);
    }

    /// A known scope set is authoritative regardless of policy.
    #[test]
    fn known_scopes_ignore_policy(tokens in prop::collection::vec(scope_token(), 1..6)) {
        let granted: BTreeSet<String> = tokens.into_iter().collect();
        for capability in Capability::ALL {
            prop_assert_eq!(
                ScopePolicy::ReadOnly.permits(&granted, capability),
                ScopePolicy::AllowAll.permits(&granted, capability)
            );
        }
    }
}
