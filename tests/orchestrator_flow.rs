//! Conversation orchestrator tests
//!
//! These tests drive a full kiosk with scripted devices under paused tokio
//! time, so backup timers and grace windows fire deterministically.

mod common;

use common::*;
use concierge::avatar::Visual;
use concierge::capability::MediaApi;
use concierge::integration::AnswerFailureMode;
use concierge::llm::prompts::{APOLOGY, DIDNT_CATCH, PLEASE_WAIT, STILL_PROCESSING};
use concierge::messages::Speaker;
use concierge::ui::state::{KioskEvent, KioskStatus};
use concierge::ConciergeError;
use std::time::Duration;

/// Trigger the welcome and wait until the kiosk listens afterwards
async fn welcome_and_listen(rig: &Rig) {
    rig.handle.trigger_welcome().unwrap();
    assert!(
        wait_until(5_000, || rig.is_listening()).await,
        "Kiosk should listen after the welcome"
    );
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_question_and_answer() {
    let rig = Rig::start(
        test_config(),
        ScriptedSynth::default(),
        ScriptedAnswers::new(vec![Ok("We're open 9 to 5".to_string())]),
    );

    welcome_and_listen(&rig).await;
    assert_eq!(rig.synth.spoken(), vec!["Welcome!"]);

    rig.recognition.say("what are your hours");

    assert!(
        wait_until(5_000, || rig.synth.spoken().len() == 2).await,
        "Answer should be spoken"
    );
    assert_eq!(rig.answers.calls(), vec!["what are your hours"]);
    assert_eq!(rig.synth.spoken()[1], "We're open 9 to 5");

    assert!(
        wait_until(5_000, || rig.avatar.loads().len() == 5).await,
        "Avatar should switch for both utterances"
    );
    assert_eq!(
        rig.avatar.loads(),
        vec![
            Visual::Idle,
            Visual::Talking,
            Visual::Idle,
            Visual::Talking,
            Visual::Idle
        ]
    );

    assert_eq!(
        rig.texts_from(Speaker::Assistant),
        vec!["Welcome!", "We're open 9 to 5"]
    );
    assert_eq!(rig.texts_from(Speaker::Visitor), vec!["what are your hours"]);

    assert!(
        wait_until(2_000, || rig.is_listening()).await,
        "Kiosk should resume listening after answering"
    );
    assert!(!rig.handle.view().read().thinking);
}

#[tokio::test(start_paused = true)]
async fn test_avatar_backup_timer_and_speech_watchdog() {
    let rig = Rig::start(
        test_config(),
        ScriptedSynth::mute(),
        ScriptedAnswers::new(vec![]),
    );

    rig.handle.trigger_welcome().unwrap();
    advance(2_500).await;
    assert_eq!(
        rig.avatar.current(),
        Some(Visual::Talking),
        "Avatar talks while speech is believed to be playing"
    );

    // Estimated duration is the 3s floor; no end event ever arrives
    advance(700).await;
    assert_eq!(
        rig.avatar.current(),
        Some(Visual::Idle),
        "Backup timer should idle the avatar"
    );
    assert!(!rig.is_listening());

    let cancels = rig.synth.cancel_count();
    assert!(
        wait_until(6_000, || rig.is_listening()).await,
        "Watchdog should stop speech and resume listening"
    );
    assert!(rig.synth.cancel_count() > cancels);
}

#[tokio::test(start_paused = true)]
async fn test_transcript_while_processing_is_rejected() {
    let rig = Rig::start(
        test_config(),
        ScriptedSynth::default(),
        ScriptedAnswers::new(vec![Ok("The cafe is on the left.".to_string())])
            .with_delay(Duration::from_secs(5)),
    );

    welcome_and_listen(&rig).await;
    rig.recognition.say("where is the cafe");
    assert!(wait_until(1_000, || rig.answers.calls().len() == 1).await);

    rig.recognition.say("and the toilets");
    rig.handle.submit_text("hello?").unwrap();
    advance(100).await;

    assert_eq!(
        rig.answers.calls(),
        vec!["where is the cafe"],
        "Only one prompt may be outstanding"
    );
    assert_eq!(rig.notice().as_deref(), Some(PLEASE_WAIT));
    assert_eq!(rig.texts_from(Speaker::Visitor), vec!["where is the cafe"]);

    assert!(
        wait_until(6_000, || rig.synth.spoken().len() == 2).await,
        "First answer is still spoken"
    );
    assert_eq!(rig.synth.spoken()[1], "The cafe is on the left.");
}

#[tokio::test(start_paused = true)]
async fn test_reset_mid_processing() {
    let rig = Rig::start(
        test_config(),
        ScriptedSynth::default(),
        ScriptedAnswers::new(vec![Ok("Stale answer".to_string())])
            .with_delay(Duration::from_secs(5)),
    );

    welcome_and_listen(&rig).await;
    rig.recognition.say("what are your hours");
    assert!(wait_until(1_000, || rig.handle.view().read().thinking).await);
    let stops = rig.recognition.stop_count();

    rig.handle.reset().unwrap();
    assert!(wait_until(1_000, || rig.messages().is_empty()).await);
    {
        let view = rig.handle.view();
        let view = view.read();
        assert!(!view.thinking);
        assert!(!view.listening);
        assert_eq!(view.status, KioskStatus::Idle);
    }
    assert!(rig.recognition.stop_count() > stops, "Reset cancels recognition");

    advance(6_000).await;
    assert_eq!(
        rig.synth.spoken(),
        vec!["Welcome!"],
        "Answer for the reset session must be dropped"
    );
    assert!(rig.drain_events().contains(&KioskEvent::SessionReset));

    welcome_and_listen(&rig).await;
    assert_eq!(rig.synth.spoken(), vec!["Welcome!", "Welcome!"]);

    // Counters start from zero: one failure stays below the threshold of two
    rig.recognition.fail("network");
    advance(100).await;
    assert!(!rig.manual_input_visible());
}

#[tokio::test(start_paused = true)]
async fn test_reset_cancels_outstanding_answer() {
    let rig = Rig::start(
        test_config(),
        ScriptedSynth::default(),
        ScriptedAnswers::new(vec![Ok("We're open 9 to 5".to_string())])
            .with_delay(Duration::from_secs(3)),
    );

    welcome_and_listen(&rig).await;
    rig.recognition.say("first question");
    assert!(wait_until(1_000, || rig.answers.is_busy()).await);

    rig.handle.reset().unwrap();
    assert!(
        wait_until(1_000, || !rig.answers.is_busy()).await,
        "Reset must release the answer generator"
    );

    welcome_and_listen(&rig).await;
    rig.recognition.say("what are your hours");
    assert!(wait_until(5_000, || rig.synth.spoken().len() == 3).await);

    let last = rig.synth.spoken()[2].clone();
    assert_ne!(last, STILL_PROCESSING, "Fresh session must not get the stand-in");
    assert_eq!(last, "We're open 9 to 5");
    assert_eq!(
        rig.answers.calls(),
        vec!["first question", "what are your hours"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_accepted_transcript_clears_notice() {
    let rig = Rig::start(
        test_config(),
        ScriptedSynth::default(),
        ScriptedAnswers::new(vec![]),
    );

    welcome_and_listen(&rig).await;
    rig.recognition.fail("network");
    assert!(
        wait_until(2_000, || rig.recognition.start_count() == 2 && rig.is_listening()).await
    );
    assert_eq!(rig.notice().as_deref(), Some(DIDNT_CATCH));
    rig.drain_events();

    rig.recognition.say("where is the exit");
    assert!(wait_until(1_000, || rig.handle.view().read().thinking).await);

    assert_eq!(rig.notice(), None);
    assert!(rig.drain_events().contains(&KioskEvent::NoticeCleared));
}

#[tokio::test(start_paused = true)]
async fn test_manual_input_engages_exactly_once() {
    let rig = Rig::start(
        test_config(),
        ScriptedSynth::default(),
        ScriptedAnswers::new(vec![Ok("Second floor.".to_string())]),
    );

    welcome_and_listen(&rig).await;
    rig.recognition.fail("network");
    assert!(
        wait_until(2_000, || rig.recognition.start_count() == 2 && rig.is_listening()).await,
        "Continuous mode restarts after a network error"
    );
    assert!(!rig.manual_input_visible());
    assert_eq!(rig.notice().as_deref(), Some(DIDNT_CATCH));

    rig.recognition.fail("network");
    assert!(wait_until(1_000, || rig.manual_input_visible()).await);

    // Further engine noise after escalation changes nothing
    rig.recognition.fail("no-speech");
    advance(2_000).await;
    let engaged = rig
        .drain_events()
        .into_iter()
        .filter(|e| *e == KioskEvent::ManualInputEngaged)
        .count();
    assert_eq!(engaged, 1, "Manual input must engage exactly once");
    assert!(!rig.is_listening());
    assert_eq!(rig.recognition.start_count(), 2);

    // The microphone button now submits the typed draft
    rig.handle.set_draft("where is the library").unwrap();
    rig.handle.toggle_microphone().unwrap();
    assert!(wait_until(2_000, || rig.synth.spoken().len() == 2).await);
    assert_eq!(rig.answers.calls(), vec!["where is the library"]);
    assert!(rig.handle.view().read().draft.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_silence_after_thanks_is_not_a_failure() {
    let config = test_config().with_manual_input_threshold(1);
    let rig = Rig::start(
        config,
        ScriptedSynth::default(),
        ScriptedAnswers::new(vec![Ok("You're welcome!".to_string())]),
    );

    welcome_and_listen(&rig).await;
    rig.recognition.say("thanks");
    assert!(wait_until(3_000, || rig.synth.spoken().len() == 2).await);
    advance(300).await;
    assert!(!rig.is_listening(), "Never listens while replying");
    assert!(
        wait_until(2_000, || rig.is_listening()).await,
        "Kiosk listens again after replying"
    );

    rig.recognition.fail("no-speech");
    advance(500).await;

    assert!(
        !rig.manual_input_visible(),
        "Expected silence must not count toward manual input"
    );
    assert_ne!(rig.notice().as_deref(), Some(DIDNT_CATCH));
}

#[tokio::test(start_paused = true)]
async fn test_denied_microphone_engages_manual_input_immediately() {
    let rig = Rig::start(
        test_config().with_manual_input_threshold(5),
        ScriptedSynth::default(),
        ScriptedAnswers::new(vec![]),
    );

    welcome_and_listen(&rig).await;
    rig.recognition.fail("not-allowed");
    assert!(wait_until(1_000, || rig.manual_input_visible()).await);

    advance(2_000).await;
    assert_eq!(
        rig.recognition.start_count(),
        1,
        "Permission errors are never retried automatically"
    );
}

#[tokio::test(start_paused = true)]
async fn test_insecure_context_offers_manual_input_at_startup() {
    let environment = ScriptedEnvironment {
        secure: false,
        hostname: "kiosk.example.org".to_string(),
        ..Default::default()
    };
    let rig = Rig::start_with(
        test_config(),
        environment,
        ScriptedRecognition::default(),
        ScriptedSynth::default(),
        ScriptedAnswers::new(vec![Ok("Here you go.".to_string())]),
    );

    assert!(wait_until(1_000, || rig.manual_input_visible()).await);
    assert!(matches!(
        rig.handle.view().read().status,
        KioskStatus::Unavailable(_)
    ));

    rig.handle.trigger_welcome().unwrap();
    advance(2_000).await;
    assert_eq!(rig.recognition.start_count(), 0, "Voice input is never attempted");

    rig.handle.submit_text("opening times").unwrap();
    assert!(wait_until(2_000, || rig.synth.spoken().len() == 2).await);
    assert_eq!(rig.answers.calls(), vec!["opening times"]);
}

#[tokio::test(start_paused = true)]
async fn test_missing_media_api_is_capability_failure() {
    let environment = ScriptedEnvironment {
        api: MediaApi::Missing,
        ..Default::default()
    };
    let rig = Rig::start_with(
        test_config(),
        environment,
        ScriptedRecognition::default(),
        ScriptedSynth::default(),
        ScriptedAnswers::new(vec![]),
    );

    assert!(wait_until(1_000, || rig.manual_input_visible()).await);
    assert!(!rig.handle.view().read().permission_prompt);
}

#[tokio::test(start_paused = true)]
async fn test_answer_failure_apologizes_by_default() {
    let rig = Rig::start(
        test_config(),
        ScriptedSynth::default(),
        ScriptedAnswers::new(vec![Err(ConciergeError::AnswerGenerator(
            "502".to_string(),
        ))]),
    );

    welcome_and_listen(&rig).await;
    rig.recognition.say("what's on today");

    // The apology is two sentences, spoken one at a time
    assert!(wait_until(3_000, || rig.synth.spoken().len() == 3).await);
    assert_eq!(rig.synth.spoken()[1..].join(" "), APOLOGY);
    assert!(rig.texts_from(Speaker::Assistant).contains(&APOLOGY.to_string()));
    advance(300).await;
    assert!(
        wait_until(2_000, || rig.is_listening()).await,
        "Conversation continues after a failed answer"
    );
}

#[tokio::test(start_paused = true)]
async fn test_answer_failure_can_be_silent() {
    let config = test_config().with_answer_failure_mode(AnswerFailureMode::Silent);
    let rig = Rig::start(
        config,
        ScriptedSynth::default(),
        ScriptedAnswers::new(vec![Err(ConciergeError::Timeout("answer".to_string()))]),
    );

    welcome_and_listen(&rig).await;
    rig.recognition.say("what's on today");
    assert!(wait_until(3_000, || rig.notice().is_some()).await);

    assert_eq!(rig.synth.spoken(), vec!["Welcome!"], "Nothing is spoken");
    assert!(!rig.texts_from(Speaker::Assistant).contains(&APOLOGY.to_string()));
    assert!(wait_until(2_000, || rig.is_listening()).await);
}

#[tokio::test(start_paused = true)]
async fn test_microphone_toggle() {
    let rig = Rig::start(
        test_config(),
        ScriptedSynth::default(),
        ScriptedAnswers::new(vec![]),
    );

    rig.handle.toggle_microphone().unwrap();
    assert!(wait_until(1_000, || rig.is_listening()).await);

    rig.handle.toggle_microphone().unwrap();
    assert!(wait_until(1_000, || !rig.is_listening()).await);
    assert_eq!(rig.handle.view().read().status, KioskStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_transcripts_outside_a_session_are_ignored() {
    let rig = Rig::start(
        test_config(),
        ScriptedSynth::default(),
        ScriptedAnswers::new(vec![]),
    );

    welcome_and_listen(&rig).await;
    let sink = rig.recognition.latest();
    rig.handle.reset().unwrap();
    advance(100).await;

    sink.emit(concierge::speech::EngineEvent::Result {
        transcript: "late words".to_string(),
        confidence: 0.8,
        is_final: true,
    });
    advance(1_000).await;
    assert!(rig.answers.calls().is_empty());
}
