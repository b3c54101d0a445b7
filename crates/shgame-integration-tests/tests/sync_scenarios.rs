//! Integration tests: token synchronization end to end.
//!
//! Drives [`TokensSource`] through the fake API the way the poll loop does
//! and checks the published models and derived collections.

use std::rc::Rc;
use std::time::Duration;

use shgame_core::api::{ApiError, GameApi};
use shgame_core::config::SyncConfig;
use shgame_core::error::TokenError;
use shgame_core::orchestration::{RecipeDef, RecipeOrchestration};
use shgame_core::source::{PollOutcome, TokensSource};
use shgame_core::test_utils::*;
use shgame_reactive::{Identity, Observable};
use tokio::task::LocalSet;

fn source_for(api: &Rc<FakeApi>, config: SyncConfig) -> Rc<TokensSource> {
    init_tracing();
    TokensSource::new(Rc::clone(api) as Rc<dyn GameApi>, config)
}

fn stack_ids(source: &TokensSource) -> Vec<String> {
    source
        .visible_element_stacks()
        .get()
        .unwrap_or_default()
        .iter()
        .map(|stack| stack.id().to_string())
        .collect()
}

// ===========================================================================
// Poll 1 / poll 2 with slot ranking
// ===========================================================================

#[tokio::test]
async fn second_poll_adds_stack_and_ranks_it_first() {
    let api = Rc::new(FakeApi::new());
    let source = source_for(&api, SyncConfig::default());
    let bench = situation_with_thresholds(
        "bench",
        "~/portage1/bench",
        "workshop.bench",
        vec![threshold("x-slot", &[], &[("x", 1)], &[])],
    );
    let a = element_stack("1", "~/hand.misc/1", "a", &[("x", 2)]);
    let b = element_stack("2", "~/hand.misc/2", "b", &[("x", 5)]);

    api.set_tokens(vec![bench.clone(), a.clone()]);
    source.poll_once().await.unwrap();
    assert_eq!(stack_ids(&source), vec!["1"]);

    let recipe = Rc::new(RecipeDef {
        id: "craft".into(),
        action_id: Some("workshop.bench".into()),
        requirements: [("x".to_string(), 1)].into_iter().collect(),
        ..RecipeDef::default()
    });
    let orchestration = RecipeOrchestration::new(recipe, &source, Vec::new());
    let slots = orchestration.slots().get().unwrap();
    assert_eq!(slots.len(), 1);
    let candidates = slots[0].available_element_stacks.clone();

    api.set_tokens(vec![bench, a, b]);
    let outcome = source.poll_once().await.unwrap();
    assert_eq!(
        outcome,
        PollOutcome::Applied {
            count: 3,
            added: 1,
            removed: 0
        }
    );
    assert_eq!(stack_ids(&source), vec!["1", "2"]);

    let ranked: Vec<String> = candidates
        .get()
        .unwrap()
        .iter()
        .map(|stack| stack.id().to_string())
        .collect();
    assert_eq!(ranked, vec!["2", "1"]);
}

// ===========================================================================
// Identity, retirement, minimality
// ===========================================================================

#[tokio::test]
async fn identity_survives_and_vanished_tokens_retire() {
    let api = Rc::new(FakeApi::new());
    let source = source_for(&api, SyncConfig::default());
    let a = element_stack("a", "~/hand.misc/a", "candle", &[("lantern", 1)]);
    let b = element_stack("b", "~/hand.misc/b", "ink", &[]);

    api.set_tokens(vec![a.clone(), b.clone()]);
    source.poll_once().await.unwrap();
    let model_a = source.model(&"a".into()).unwrap();
    let model_b = source.model(&"b".into()).unwrap();

    api.set_tokens(vec![element_stack("a", "~/hand.misc/a", "candle", &[("lantern", 2)])]);
    source.poll_once().await.unwrap();

    assert!(source.model(&"a".into()).unwrap().same(&model_a));
    assert!(model_b.is_retired());
    assert!(matches!(model_b.update(&b), Err(TokenError::Retired { .. })));
    assert_eq!(
        model_a.as_element_stack().unwrap().snapshot().aspects["lantern"],
        2
    );
}

#[tokio::test]
async fn unchanged_poll_does_not_reemit_derived_lists() {
    let api = Rc::new(FakeApi::new());
    let source = source_for(&api, SyncConfig::default());
    api.set_tokens(vec![
        element_stack("a", "~/hand.misc/a", "candle", &[("lantern", 1)]),
        situation("desk", "~/portage1/desk", "library.desk"),
        terrain("foyer", "~/library!foyer", false, false),
    ]);
    source.poll_once().await.unwrap();

    let lists = [
        source.tokens().version(),
        source.visible_tokens().version(),
        source.visible_element_stacks().version(),
        source.unlocked_workstations().version(),
        source.unlocked_terrains().version(),
    ];
    source.poll_once().await.unwrap();
    let after = [
        source.tokens().version(),
        source.visible_tokens().version(),
        source.visible_element_stacks().version(),
        source.unlocked_workstations().version(),
        source.unlocked_terrains().version(),
    ];
    assert_eq!(lists, after);
}

#[tokio::test]
async fn moving_into_a_shrouded_terrain_hides_a_stack() {
    let api = Rc::new(FakeApi::new());
    let source = source_for(&api, SyncConfig::default());
    let foyer = terrain("foyer", "~/library!foyer", false, false);
    let attic = terrain("attic", "~/library!attic", false, true);

    api.set_tokens(vec![
        foyer.clone(),
        attic.clone(),
        element_stack("book", "~/library!foyer/shelf/book", "book", &[]),
    ]);
    source.poll_once().await.unwrap();
    assert_eq!(stack_ids(&source), vec!["book"]);
    let book = source.model(&"book".into()).unwrap();
    let parent = book.parent_terrain();
    assert_eq!(parent.get().flatten().unwrap().id().as_str(), "foyer");

    api.set_tokens(vec![
        foyer,
        attic,
        element_stack("book", "~/library!attic/shelf/book", "book", &[]),
    ]);
    source.poll_once().await.unwrap();
    assert!(stack_ids(&source).is_empty());
    assert!(parent.get().flatten().is_none());
    assert!(source.model(&"book".into()).unwrap().same(&book));
}

// ===========================================================================
// Errors
// ===========================================================================

#[tokio::test]
async fn transport_failure_leaves_models_untouched() {
    let api = Rc::new(FakeApi::new());
    let source = source_for(&api, SyncConfig::default());
    api.set_tokens(vec![element_stack("a", "~/hand.misc/a", "candle", &[])]);
    source.poll_once().await.unwrap();

    api.fail_next_fetch(ApiError::Transport {
        detail: "connection refused".into(),
    });
    let err = source.poll_once().await.unwrap_err();
    assert!(!err.is_fatal());
    assert_eq!(source.model_count(), 1);
    assert!(!source.model(&"a".into()).unwrap().is_retired());
}

#[tokio::test]
async fn unknown_payload_type_fails_the_poll() {
    let api = Rc::new(FakeApi::new());
    let mut config = SyncConfig::default();
    config.payload_types.push("Dream".into());
    let source = source_for(&api, config);

    let mut dream = element_stack("d", "~/hand.misc/d", "dream", &[]);
    dream.payload_type = "Dream".into();
    api.set_tokens(vec![dream]);
    let err = source.poll_once().await.unwrap_err();
    assert!(matches!(err, TokenError::UnknownPayloadType { .. }));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn stale_poll_result_is_discarded() {
    let api = Rc::new(FakeApi::with_tokens(vec![element_stack(
        "a",
        "~/hand.misc/a",
        "candle",
        &[],
    )]));
    let source = source_for(&api, SyncConfig::default());
    let gate = api.defer_next_fetch();

    let local = LocalSet::new();
    local
        .run_until(async {
            let poll = tokio::task::spawn_local({
                let source = Rc::clone(&source);
                async move { source.poll_once().await }
            });
            while api.fetch_count() == 0 {
                tokio::task::yield_now().await;
            }

            source.stop_polling();
            let _ = gate.send(());
            let outcome = poll.await.unwrap().unwrap();
            assert_eq!(outcome, PollOutcome::Stale);
            assert_eq!(source.model_count(), 0);
            assert!(source.tokens().get().is_none());
        })
        .await;
}

// ===========================================================================
// Scheduled polling
// ===========================================================================

fn fast_config() -> SyncConfig {
    SyncConfig {
        poll_interval_ms: 100,
        ..SyncConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn polls_only_while_running() {
    let api = Rc::new(FakeApi::with_tokens(vec![element_stack(
        "a",
        "~/hand.misc/a",
        "candle",
        &[],
    )]));
    let source = source_for(&api, fast_config());
    let running = Observable::with_value(false);

    let local = LocalSet::new();
    local
        .run_until(async {
            source.attach_running(&running);
            tokio::time::sleep(Duration::from_millis(250)).await;
            assert_eq!(api.fetch_count(), 0);
            assert!(!source.is_polling());

            running.set(true);
            assert!(source.is_polling());
            tokio::time::sleep(Duration::from_millis(250)).await;
            assert_eq!(api.fetch_count(), 3);
            assert_eq!(source.model_count(), 1);

            running.set(false);
            assert!(!source.is_polling());
            tokio::time::sleep(Duration::from_millis(500)).await;
            assert_eq!(api.fetch_count(), 3);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn transport_errors_keep_polling_and_fatal_errors_stop_it() {
    let api = Rc::new(FakeApi::new());
    let mut config = fast_config();
    config.payload_types.push("Dream".into());
    let source = source_for(&api, config);
    let running = Observable::with_value(true);

    let local = LocalSet::new();
    local
        .run_until(async {
            api.fail_next_fetch(ApiError::Rejected {
                status: 503,
                message: "loading".into(),
            });
            source.attach_running(&running);
            tokio::time::sleep(Duration::from_millis(150)).await;
            assert_eq!(api.fetch_count(), 2);
            assert!(source.is_polling());

            let mut dream = element_stack("d", "~/hand.misc/d", "dream", &[]);
            dream.payload_type = "Dream".into();
            api.set_tokens(vec![dream]);
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(api.fetch_count(), 3);
            assert!(!source.is_polling());

            tokio::time::sleep(Duration::from_millis(500)).await;
            assert_eq!(api.fetch_count(), 3);
        })
        .await;
}
