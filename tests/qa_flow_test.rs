use std::{fs, sync::Arc, sync::Mutex};

use channel_plugin::message::{CallbackQuery, ChannelMessage, Participant};
use channel_plugin::plugin_test_util::{ChannelOp, MockChannel};
use futures::FutureExt;
use greentic_dialog::channel::CallbackRegistry;
use greentic_dialog::flow::{CompletionHandler, FlowCompletion, FlowEngine, FlowRegistry};
use greentic_dialog::state::{FlowData, StateValue};

const SIGNUP: &str = r#"
name: signup
message_action: strip_keyboard
questions:
  - id: name
    prompt: "What is your name?"
  - id: age
    prompt: "How old are you, {{state.name}}?"
    answer: { type: number, min: 0, max: 120 }
  - id: colour
    prompt: "Pick a colour"
    answer: { type: choice, options: [Red, Green] }
    state_key: favourite_colour
"#;

fn recorder() -> (CompletionHandler, Arc<Mutex<Vec<FlowCompletion>>>) {
    let seen = Arc::new(Mutex::new(vec![]));
    let sink = seen.clone();
    let handler: CompletionHandler = Arc::new(move |done: FlowCompletion| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(done);
            anyhow::Ok(())
        }
        .boxed()
    });
    (handler, seen)
}

fn say(body: &str) -> ChannelMessage {
    ChannelMessage::text("mock", "c1", Participant::with_id("u1"), body)
}

#[tokio::test]
async fn question_file_runs_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("signup.ygtc"), SIGNUP).unwrap();
    fs::write(dir.path().join("broken.ygtc"), "name: [").unwrap();
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let (handler, seen) = recorder();
    let mut registry = FlowRegistry::new();
    assert_eq!(registry.load_dir(dir.path(), Some(handler)).unwrap(), 1);

    let mock = MockChannel::new();
    let engine = FlowEngine::for_channel(registry, mock.clone(), CallbackRegistry::new(60));
    engine.start_flow("u1", "c1", "signup", FlowData::new()).await.unwrap();

    engine.handle_update(&say("Zoe")).await.unwrap();
    engine.handle_update(&say("two hundred")).await.unwrap();
    engine.handle_update(&say("150")).await.unwrap();
    assert_eq!(engine.user_state("u1").unwrap().current_step, "age");
    engine.handle_update(&say("33")).await.unwrap();

    let colour_prompt = mock.last_sent().unwrap();
    assert_eq!(colour_prompt.text_content(), Some("Pick a colour"));
    let green = colour_prompt.keyboard.as_ref().unwrap().buttons().nth(1).unwrap().data.clone();

    let press = CallbackQuery {
        id: "cb-1".into(),
        token: green,
        message_id: Some(colour_prompt.id.clone()),
        message_text: Some("Pick a colour".into()),
    };
    engine
        .handle_update(&ChannelMessage::callback("mock", "c1", Participant::with_id("u1"), press))
        .await
        .unwrap();

    assert_eq!(
        mock.sent_texts()[..5],
        [
            "What is your name?",
            "How old are you, Zoe?",
            "please enter a number\nHow old are you, Zoe?",
            "must be between 0 and 120\nHow old are you, Zoe?",
            "Pick a colour",
        ]
    );
    assert!(mock.ops().contains(&ChannelOp::KeyboardEdited {
        chat_id: "c1".into(),
        message_id: colour_prompt.id,
        keyboard: None,
    }));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let data = &seen[0].data;
    assert_eq!(data.get("name"), Some(&StateValue::String("Zoe".into())));
    assert_eq!(data.get("age"), Some(&StateValue::Number(33.0)));
    assert_eq!(data.get("favourite_colour"), Some(&StateValue::String("Green".into())));
    assert!(!engine.is_user_in_flow("u1"));
}

#[tokio::test]
async fn typed_choice_matches_without_case() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("signup.ygtc"), SIGNUP).unwrap();
    let (handler, seen) = recorder();
    let mut registry = FlowRegistry::new();
    registry.load_dir(dir.path(), Some(handler)).unwrap();

    let mock = MockChannel::new();
    let engine = FlowEngine::for_channel(registry, mock.clone(), CallbackRegistry::new(60));
    engine.start_flow("u1", "c1", "signup", FlowData::new()).await.unwrap();
    for answer in ["Yan", "41", "purple", "red"] {
        engine.handle_update(&say(answer)).await.unwrap();
    }

    assert_eq!(mock.sent_texts().last().unwrap(), "please choose one of: Red, Green\nPick a colour");
    assert_eq!(seen.lock().unwrap()[0].data.get("favourite_colour"), Some(&StateValue::String("Red".into())));
}
