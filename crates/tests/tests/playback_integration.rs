mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{instant_controller, latest_snapshot, CancelAfter};
use pulse_core::{
    collapse_snapshots, compile_prompt, explain, Artifact, Checkpoint, FacetSelection, Reveal,
};
use pulse_observability::PlaybackMetrics;
use pulse_playback::{
    PlaybackConfig, PlaybackController, PlaybackError, PlaybackEvent, PlaybackOutcome,
    PlaybackState,
};
use pulse_storage::{CheckpointStore, ConversationStore, MemoryStore, Store};
use tokio_util::sync::CancellationToken;

const PROMPT: &str = "Flash sale 20% off, email and sms";

fn paced_controller() -> PlaybackController<MemoryStore> {
    let mut config = PlaybackConfig::instant();
    config.json.delay = Duration::from_millis(1);
    config.explanation.delay = Duration::from_millis(1);
    PlaybackController::new(Arc::new(MemoryStore::new()), config, PlaybackMetrics::shared())
}

fn sqlite_url(dir: &tempfile::TempDir) -> String {
    format!("sqlite://{}/pulse.db?mode=rwc", dir.path().display())
}

#[tokio::test]
async fn resume_from_offset_37_reproduces_the_full_serialization() {
    let payload = compile_prompt(PROMPT, &FacetSelection::default());
    let full_json = payload.to_pretty_json().expect("payload serializes");

    let mut reveal = Reveal::new(full_json.clone(), 5);
    for _ in 0..37 {
        reveal.advance();
    }
    let mut checkpoint = Checkpoint::start(payload.clone(), PROMPT, "stream-fixed".to_string());
    checkpoint.json_index = reveal.position();
    checkpoint.streamed_json = reveal.revealed().to_string();
    assert_eq!(checkpoint.json_index, 37);
    assert_eq!(
        format!("{}{}", checkpoint.streamed_json, &full_json[checkpoint.streamed_json.len()..]),
        full_json
    );

    let store = MemoryStore::new();
    store
        .save_checkpoint("c1", &checkpoint)
        .await
        .expect("checkpoint saves");
    let controller = instant_controller(store);

    let outcome = controller
        .resume("c1", &CancellationToken::new())
        .await
        .expect("resume succeeds");
    assert!(matches!(outcome, PlaybackOutcome::Completed(_)));

    let messages = controller.store().messages("c1").await.expect("messages load");
    assert_eq!(latest_snapshot(&messages, "stream-fixed"), Some(full_json));
    assert!(messages
        .iter()
        .filter(|m| m.stream_token.as_deref() == Some("stream-fixed"))
        .all(|m| m.content.len() > checkpoint.streamed_json.len()));

    let first_explanation = messages
        .iter()
        .position(|m| m.id.starts_with("explanation-"))
        .expect("explanation revealed");
    assert!(messages[first_explanation - 1].id.starts_with("stream-fixed-"));
    assert!(!messages[first_explanation - 1].streaming);
    assert_eq!(
        latest_snapshot(&messages, "explanation-"),
        Some(explain(&payload, PROMPT))
    );
}

#[tokio::test]
async fn paused_run_survives_a_restart_on_sqlite() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = sqlite_url(&dir);
    let pause = CancellationToken::new();

    let first_run = {
        let store = Store::sqlite(&url).await.expect("sqlite opens");
        let controller = instant_controller(CancelAfter::new(store, pause.clone(), 3));
        controller
            .start("c1", PROMPT, &FacetSelection::default(), &pause)
            .await
            .expect("start succeeds")
    };
    let PlaybackOutcome::Paused(paused) = first_run else {
        panic!("expected the first run to pause");
    };
    assert_eq!(paused.json_index, 11);

    let controller = instant_controller(Store::sqlite(&url).await.expect("sqlite reopens"));
    assert_eq!(
        controller.select_conversation("c1").await.expect("select"),
        PlaybackState::Paused(Artifact::PayloadJson)
    );

    let outcome = controller
        .resume("c1", &CancellationToken::new())
        .await
        .expect("resume succeeds");
    let PlaybackOutcome::Completed(payload) = outcome else {
        panic!("expected completion after resume");
    };
    assert_eq!(payload.campaign_id, paused.payload.campaign_id);

    let messages = controller.store().messages("c1").await.expect("messages load");
    assert_eq!(
        latest_snapshot(&messages, &paused.stream_id),
        Some(payload.to_pretty_json().expect("payload serializes"))
    );
    assert!(controller
        .store()
        .load_checkpoint("c1")
        .await
        .expect("load")
        .is_none());

    let collapsed = collapse_snapshots(&messages);
    assert_eq!(collapsed.len(), 3);
    assert_eq!(
        controller.store().list_conversations().await.expect("list")[0].title,
        format!("{PROMPT}...")
    );
}

#[tokio::test]
async fn pausing_mid_json_leaves_explanation_untouched() {
    let controller = paced_controller();
    let pause = CancellationToken::new();
    let facets = FacetSelection::default();

    let (outcome, _) = tokio::join!(
        controller.start("c1", PROMPT, &facets, &pause),
        async {
            tokio::time::sleep(Duration::from_millis(25)).await;
            pause.cancel();
        }
    );

    let PlaybackOutcome::Paused(checkpoint) = outcome.expect("start succeeds") else {
        panic!("expected pause");
    };
    assert_eq!(checkpoint.artifact(), Artifact::PayloadJson);
    assert!(checkpoint.json_index > 0);
    assert_eq!(checkpoint.explanation_index, 0);
    assert!(checkpoint.streamed_explanation.is_empty());
    assert!(checkpoint.explanation_id.is_none());

    let stored = controller
        .store()
        .load_checkpoint("c1")
        .await
        .expect("load")
        .expect("checkpoint persisted");
    assert_eq!(stored, *checkpoint);

    let messages = controller.store().messages("c1").await.expect("messages load");
    assert!(messages.iter().all(|m| !m.id.starts_with("explanation-")));
    assert!(messages.iter().all(|m| !m.streaming));
}

#[tokio::test]
async fn global_stop_returns_to_idle_without_a_checkpoint() {
    let controller = paced_controller();
    let facets = FacetSelection::default();
    let never = CancellationToken::new();

    let (outcome, _) = tokio::join!(
        controller.start("c1", PROMPT, &facets, &never),
        async {
            tokio::time::sleep(Duration::from_millis(25)).await;
            controller.stop_all();
        }
    );

    assert_eq!(outcome.expect("start succeeds"), PlaybackOutcome::Stopped);
    assert_eq!(controller.state("c1"), PlaybackState::Idle);
    assert!(controller
        .store()
        .load_checkpoint("c1")
        .await
        .expect("load")
        .is_none());
    assert!(matches!(
        controller.resume("c1", &CancellationToken::new()).await,
        Err(PlaybackError::NothingToResume(_))
    ));
}

#[tokio::test]
async fn concurrent_start_on_the_same_conversation_is_busy() {
    let controller = paced_controller();
    let pause = CancellationToken::new();
    let facets = FacetSelection::default();

    let (first, second) = tokio::join!(
        controller.start("c1", PROMPT, &facets, &pause),
        async {
            let result = controller.start("c1", PROMPT, &facets, &pause).await;
            pause.cancel();
            result
        }
    );

    assert!(matches!(second, Err(PlaybackError::Busy(_))));
    assert!(matches!(first, Ok(PlaybackOutcome::Paused(_))));
}

#[tokio::test]
async fn corrupt_checkpoint_reads_as_idle_and_is_dropped() {
    let store = MemoryStore::new();
    store.put_raw_checkpoint("c1", "{\"jsonIndex\": \"twelve\"}");
    let controller = instant_controller(store);

    assert_eq!(
        controller.select_conversation("c1").await.expect("select"),
        PlaybackState::Idle
    );
    assert!(matches!(
        controller.resume("c1", &CancellationToken::new()).await,
        Err(PlaybackError::NothingToResume(_))
    ));
    assert_eq!(controller.state("c1"), PlaybackState::Idle);
}

#[tokio::test]
async fn events_mirror_the_conversation_log() {
    let controller = instant_controller(MemoryStore::new());
    let mut events = controller.subscribe();

    controller
        .start("c1", PROMPT, &FacetSelection::default(), &CancellationToken::new())
        .await
        .expect("start succeeds");

    let mut snapshots = Vec::new();
    let mut completed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            PlaybackEvent::Snapshot { message, .. } => snapshots.push(message),
            PlaybackEvent::Completed { conversation_id } => {
                assert_eq!(conversation_id, "c1");
                completed = true;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    let messages = controller.store().messages("c1").await.expect("messages load");
    assert!(completed);
    assert_eq!(snapshots.len(), messages.len() - 1);
    assert_eq!(snapshots.last(), messages.last());

    let metrics = controller.metrics().snapshot();
    assert_eq!(metrics.snapshots_total as usize, snapshots.len());
    assert_eq!(metrics.compiles_total, 1);
    assert_eq!(metrics.completions_total, 1);
}

#[tokio::test]
async fn new_prompt_supersedes_a_paused_checkpoint() {
    let pause = CancellationToken::new();
    let controller = instant_controller(CancelAfter::new(MemoryStore::new(), pause.clone(), 2));

    let first = controller
        .start("c1", PROMPT, &FacetSelection::default(), &pause)
        .await
        .expect("start succeeds");
    assert!(matches!(first, PlaybackOutcome::Paused(_)));

    let second = controller
        .start(
            "c1",
            "VIP exclusive access event",
            &FacetSelection::default(),
            &CancellationToken::new(),
        )
        .await
        .expect("second start succeeds");
    let PlaybackOutcome::Completed(payload) = second else {
        panic!("expected completion");
    };
    assert!(payload.offer.is_none());
    assert_eq!(controller.state("c1"), PlaybackState::Completed);
    assert!(controller
        .store()
        .load_checkpoint("c1")
        .await
        .expect("load")
        .is_none());
}
