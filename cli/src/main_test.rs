use super::*;
use studyrooms_chat::ChatParticipant;
use time::macros::datetime;

fn message(sender: &str, text: &str, is_own: bool) -> ChatMessage {
    ChatMessage {
        id: format!("m-{text}"),
        sender_id: sender.to_lowercase(),
        sender_name: sender.to_owned(),
        text: text.to_owned(),
        timestamp: datetime!(2025-03-01 09:05 UTC),
        is_own,
    }
}

#[test]
fn parse_input_recognizes_commands_and_text() {
    assert_eq!(parse_input("/quit"), Input::Quit);
    assert_eq!(parse_input("  /who "), Input::Who);
    assert_eq!(parse_input("/disconnect"), Input::Disconnect);
    assert_eq!(parse_input("/reconnect"), Input::Reconnect);
    assert_eq!(parse_input("/clear"), Input::Clear);
    assert_eq!(parse_input("/dance"), Input::Unknown("/dance".to_owned()));
    assert_eq!(parse_input("hello /who"), Input::Text("hello /who".to_owned()));
}

#[test]
fn format_message_marks_own_messages() {
    assert_eq!(format_message(&message("Ada", "hi", true)), "[09:05] Ada (you): hi");
    assert_eq!(format_message(&message("Bea", "yo", false)), "[09:05] Bea: yo");
}

#[test]
fn view_prints_only_changes() {
    let mut view = View::default();
    let mut state = ChatState { connection: ConnectionState::Connected, ..ChatState::default() };
    assert_eq!(view.render(&state), vec!["-- Connected"]);

    state.messages.push(message("Bea", "hello", false));
    state.member_count = 2;
    assert_eq!(view.render(&state), vec!["[09:05] Bea: hello", "-- 2 in room"]);
    assert!(view.render(&state).is_empty());

    state.error = Some("Not connected to chat".to_owned());
    assert_eq!(view.render(&state), vec!["!! Not connected to chat"]);
    state.error = None;
    assert!(view.render(&state).is_empty());
}

#[test]
fn who_rows_show_presence_and_self() {
    let state = ChatState {
        participants: vec![
            ChatParticipant { user_id: "u1".to_owned(), username: "Ada Lovelace".to_owned(), is_online: true },
            ChatParticipant { user_id: "u2".to_owned(), username: "Bea".to_owned(), is_online: false },
        ],
        self_user_id: Some("u1".to_owned()),
        ..ChatState::default()
    };
    assert_eq!(who_rows(&state), vec!["* [AL] Ada Lovelace (you)", "  [B] Bea"]);
    assert_eq!(who_rows(&ChatState::default()), vec!["-- nobody here yet"]);
}

#[tokio::test]
async fn token_only_session_carries_explicit_token() {
    let session = TokenOnlySession("tok".to_owned()).current_session().await.unwrap().unwrap();
    assert_eq!(session.session.and_then(|s| s.token).as_deref(), Some("tok"));
}

#[tokio::test]
async fn explicit_token_is_presented_without_auth_service() {
    let config = ChatConfig::new("ws://127.0.0.1:1/ws/chat").unwrap();
    let provider = token_provider(&config, Some("tok".to_owned()), None).unwrap();
    assert_eq!(provider.acquire().await.unwrap(), "tok");
}

#[test]
fn session_token_flag_is_documented_as_bearer() {
    use clap::CommandFactory;

    let command = Cli::command();
    let arg = command.get_arguments().find(|a| a.get_id() == "session_token").unwrap();
    let help = arg.get_help().unwrap().to_string();
    assert!(help.contains("Bearer"), "{help}");
    assert!(!help.contains("cookie"), "{help}");
}
