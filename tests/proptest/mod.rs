// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for kube-admission-core.
//!
//! Uses proptest to generate random inputs and verify invariants.

#[path = "../common/fixtures.rs"]
mod fixtures;

use proptest::prelude::*;

use fixtures::{Script, ScriptedWebhook, erased};
use kube_admission_core::config::{ENV_INSECURE, ServerConfig};
use kube_admission_core::webhooks::{
    DispatchMode, Registry, ServerEvent, ServerPhase, TransitionResult, WebhookKind,
    resolve_action, transition, webhook_path,
};

/// Strategy for generating webhook names usable as a path segment.
fn webhook_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,15}"
}

/// Strategy for generating action suffixes, possibly multi-segment.
fn action() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,8}(/[a-z0-9]{1,8}){0,2}"
}

fn any_kind() -> impl Strategy<Value = WebhookKind> {
    prop_oneof![Just(WebhookKind::Mutating), Just(WebhookKind::Validating)]
}

fn any_phase() -> impl Strategy<Value = ServerPhase> {
    prop_oneof![
        Just(ServerPhase::Created),
        Just(ServerPhase::Listening),
        Just(ServerPhase::ShuttingDown),
        Just(ServerPhase::Stopped),
    ]
}

fn any_event() -> impl Strategy<Value = ServerEvent> {
    prop_oneof![
        Just(ServerEvent::Bound),
        Just(ServerEvent::ShutdownRequested),
        Just(ServerEvent::Drained),
        Just(ServerEvent::TransportFailed),
    ]
}

proptest! {
    /// Property: prefix plus "/" plus action resolves back to the action.
    #[test]
    fn test_action_reconstructs_path(
        kind in any_kind(),
        name in webhook_name(),
        action in action()
    ) {
        let prefix = webhook_path(kind, &name);
        let path = format!("{}/{}", prefix, action);
        prop_assert_eq!(resolve_action(&path, &prefix), Some(action.as_str()));
        prop_assert_eq!(resolve_action(&prefix, &prefix), Some(""));
    }

    /// Property: a name extended within the same segment never matches.
    #[test]
    fn test_action_respects_segment_boundary(
        kind in any_kind(),
        name in webhook_name(),
        tail in "[a-z0-9]{1,8}"
    ) {
        let prefix = webhook_path(kind, &name);
        let path = format!("{}{}", prefix, tail);
        prop_assert_eq!(resolve_action(&path, &prefix), None);
    }

    /// Property: the other kind's path never matches.
    #[test]
    fn test_kinds_do_not_overlap(name in webhook_name(), action in action()) {
        let path = format!("{}/{}", webhook_path(WebhookKind::Mutating, &name), action);
        let prefix = webhook_path(WebhookKind::Validating, &name);
        prop_assert_eq!(resolve_action(&path, &prefix), None);
    }

    /// Property: candidates come back in registration order.
    #[test]
    fn test_candidates_follow_registration_order(count in 1usize..6, action in action()) {
        let hooks: Vec<_> = (0..count)
            .map(|i| {
                ScriptedWebhook::mounted(
                    format!("hook-{i}"),
                    WebhookKind::Mutating,
                    "/mutate/shared",
                    Script::Decline,
                )
            })
            .collect();
        let registry = Registry::from_webhooks(
            DispatchMode::SharedPrefix,
            hooks.iter().map(erased),
        )
        .unwrap();

        let path = format!("/mutate/shared/{}", action);
        let matched: Vec<_> = registry
            .candidates(&path)
            .map(|(registration, found)| {
                (std::sync::Arc::as_ptr(registration.webhook()) as *const (), found.to_string())
            })
            .collect();

        prop_assert_eq!(matched.len(), count);
        for (hook, (ptr, found)) in hooks.iter().zip(matched) {
            prop_assert_eq!(std::sync::Arc::as_ptr(hook) as *const (), ptr);
            prop_assert_eq!(found, action.clone());
        }
    }

    /// Property: both modes reject any repeated kind and name.
    #[test]
    fn test_modes_reject_duplicates(
        kind in any_kind(),
        name in webhook_name(),
        mode in prop_oneof![Just(DispatchMode::ExactPath), Just(DispatchMode::SharedPrefix)]
    ) {
        let a = ScriptedWebhook::new(&name, kind, Script::Allow);
        let b = ScriptedWebhook::new(&name, kind, Script::Allow);
        let result = Registry::from_webhooks(mode, [erased(&a), erased(&b)]);
        prop_assert!(result.is_err());
    }

    /// Property: transitions are deterministic.
    #[test]
    fn test_transitions_deterministic(phase in any_phase(), event in any_event()) {
        prop_assert_eq!(transition(phase, event), transition(phase, event));
    }

    /// Property: Stopped is terminal.
    #[test]
    fn test_stopped_is_terminal(event in any_event()) {
        let is_invalid = matches!(
            transition(ServerPhase::Stopped, event),
            TransitionResult::InvalidTransition { .. }
        );
        prop_assert!(is_invalid, "Stopped should not transition on {:?}", event);
    }

    /// Property: no transition leads back to Created.
    #[test]
    fn test_created_is_not_reentered(phase in any_phase(), event in any_event()) {
        if let TransitionResult::Success { to, .. } = transition(phase, event) {
            prop_assert_ne!(to, ServerPhase::Created);
        }
    }

    /// Property: boolean spellings are case-insensitive.
    #[test]
    fn test_insecure_flag_spellings(
        value in prop_oneof![
            Just("true"), Just("1"), Just("yes"), Just("on"),
            Just("false"), Just("0"), Just("no"), Just("off"),
        ],
        upper in any::<bool>()
    ) {
        let expected = matches!(value, "true" | "1" | "yes" | "on");
        let spelled = if upper { value.to_ascii_uppercase() } else { value.to_string() };
        let config = ServerConfig::from_lookup(|name| {
            (name == ENV_INSECURE).then(|| spelled.clone())
        })
        .unwrap();
        prop_assert_eq!(config.tls.insecure, expected);
    }

    /// Property: dispatch mode display parses back.
    #[test]
    fn test_dispatch_mode_roundtrip(
        mode in prop_oneof![Just(DispatchMode::ExactPath), Just(DispatchMode::SharedPrefix)]
    ) {
        prop_assert_eq!(mode.to_string().parse::<DispatchMode>().unwrap(), mode);
    }
}
