use super::conversations::{format_file, format_grouped, format_message};
use super::*;
use crate::api::{FileRecord, MessageRecord};
use crate::core::conversation::Conversation;
use crate::utils::test_utils::test_client;
use chrono::{Duration, FixedOffset, TimeZone, Utc};
use tempfile::TempDir;

mod test_helpers {
    use super::*;

    pub(super) fn parse_args(argv: &[&str]) -> Args {
        Args::try_parse_from(argv)
            .unwrap_or_else(|err| panic!("argv={argv:?} should parse successfully: {err}"))
    }

    pub(super) fn context(config: Config, dir: &TempDir) -> CliContext {
        let settings_store = SettingsStore::new(dir.path().join("settings.json"));
        let settings = settings_store.load();
        CliContext {
            config,
            settings_store,
            settings,
            client: test_client(),
            transcript: None,
        }
    }
}

use test_helpers::{context, parse_args};

#[test]
fn no_subcommand_defaults_to_chat() {
    let args = parse_args(&["ollamacode"]);
    assert!(args.command.is_none());
    assert!(!args.no_keyring);
}

#[test]
fn global_flags_parse_after_subcommand() {
    let argv = [
        "ollamacode",
        "chat",
        "--conversation",
        "42",
        "--no-keyring",
        "-t",
        "chat.log",
    ];
    let args = parse_args(&argv);
    assert!(args.no_keyring);
    assert_eq!(args.transcript.as_deref(), Some("chat.log"));
    match args.command {
        Some(Commands::Chat { conversation }) => assert_eq!(conversation, Some(42)),
        _ => panic!("expected chat subcommand for argv={argv:?}"),
    }
}

#[test]
fn ask_collects_prompt_words_and_attachment() {
    let argv = ["ollamacode", "ask", "-a", "notes.md", "o", "que", "é", "isso?"];
    match parse_args(&argv).command {
        Some(Commands::Ask { attach, prompt }) => {
            assert_eq!(attach, Some(PathBuf::from("notes.md")));
            assert_eq!(prompt.join(" "), "o que é isso?");
        }
        _ => panic!("expected ask subcommand for argv={argv:?}"),
    }
}

#[test]
fn conversation_rename_requires_a_title() {
    assert!(Args::try_parse_from(["ollamacode", "conversations", "rename", "3"]).is_err());

    let argv = ["ollamacode", "conversations", "rename", "3", "Novo", "título"];
    match parse_args(&argv).command {
        Some(Commands::Conversations {
            command: ConversationCommands::Rename { id, title },
        }) => {
            assert_eq!(id, 3);
            assert_eq!(title.join(" "), "Novo título");
        }
        _ => panic!("expected conversations rename for argv={argv:?}"),
    }
}

#[test]
fn settings_subcommand_is_optional_and_set_keeps_hyphen_values() {
    match parse_args(&["ollamacode", "settings"]).command {
        Some(Commands::Settings { command: None }) => {}
        _ => panic!("expected bare settings"),
    }

    let argv = ["ollamacode", "settings", "set", "temperature", "-1"];
    match parse_args(&argv).command {
        Some(Commands::Settings {
            command: Some(SettingsCommands::Set { key, value }),
        }) => {
            assert_eq!(key, "temperature");
            assert_eq!(value, vec!["-1".to_string()]);
        }
        _ => panic!("expected settings set for argv={argv:?}"),
    }
}

#[test]
fn signup_accepts_profile_flags() {
    let argv = [
        "ollamacode",
        "signup",
        "ana@example.com",
        "--username",
        "ana",
        "--full-name",
        "Ana Souza",
    ];
    match parse_args(&argv).command {
        Some(Commands::Signup {
            email,
            username,
            full_name,
        }) => {
            assert_eq!(email.as_deref(), Some("ana@example.com"));
            assert_eq!(username.as_deref(), Some("ana"));
            assert_eq!(full_name.as_deref(), Some("Ana Souza"));
        }
        _ => panic!("expected signup for argv={argv:?}"),
    }
}

#[test]
fn backend_url_from_config_wins_over_settings() {
    let dir = TempDir::new().unwrap();
    let ctx = context(Config::default(), &dir);
    assert_eq!(ctx.backend_url(), "http://localhost:5000");

    let config = Config {
        backend_url: Some("http://gpu-box:8080/".into()),
        ..Config::default()
    };
    let ctx = context(config, &dir);
    assert_eq!(ctx.backend_url(), "http://gpu-box:8080");
}

#[test]
fn store_requires_configuration() {
    let dir = TempDir::new().unwrap();
    let ctx = context(Config::default(), &dir);
    assert!(matches!(ctx.store(), Err(StoreError::NotConfigured)));
}

#[test]
fn grouped_listing_has_headers_and_blank_separators() {
    let tz = FixedOffset::east_opt(0).unwrap();
    let now = tz.with_ymd_and_hms(2024, 5, 20, 15, 0, 0).unwrap();
    let conversation = |id: i64, title: &str, updated_at: chrono::DateTime<Utc>| Conversation {
        id,
        title: title.to_string(),
        created_at: updated_at.to_rfc3339(),
        updated_at: updated_at.to_rfc3339(),
        user_id: Some("user-1".to_string()),
    };
    let conversations = vec![
        conversation(2, "Hoje", now.with_timezone(&Utc) - Duration::hours(1)),
        conversation(1, "Antiga", now.with_timezone(&Utc) - Duration::days(90)),
    ];

    let lines = format_grouped(&conversations, &now);
    assert_eq!(lines.len(), 5);
    assert!(lines[0].ends_with(':'));
    assert!(lines[1].contains("#2") && lines[1].ends_with("Hoje"));
    assert_eq!(lines[2], "");
    assert!(lines[3].ends_with(':'));
    assert!(lines[4].contains("#1") && lines[4].ends_with("Antiga"));
}

#[test]
fn messages_render_speaker_and_attachments() {
    let record = MessageRecord {
        id: Some(5),
        conversation_id: 1,
        user_id: None,
        role: "user".into(),
        content: "veja o arquivo".into(),
        timestamp: 0,
        created_at: None,
        files: Some(vec![FileRecord {
            id: Some(9),
            message_id: 5,
            user_id: None,
            filename: "data.csv".into(),
            file_type: "text/csv".into(),
            file_size: 2048,
            file_content: None,
            file_url: None,
            created_at: None,
        }]),
    };
    let text = format_message(&record);
    assert!(text.starts_with("You: veja o arquivo [message #5]"));
    assert!(text.contains("📎 data.csv (2 KB) [file #9]"));

    let reply = MessageRecord {
        role: "assistant".into(),
        files: None,
        ..record
    };
    assert!(format_message(&reply).starts_with("Assistant: "));
}

#[test]
fn profile_flags_are_all_optional() {
    match parse_args(&["ollamacode", "profile", "--avatar-url", "https://cdn.example/a.png"]).command {
        Some(Commands::Profile {
            username,
            full_name,
            avatar_url,
        }) => {
            assert!(username.is_none() && full_name.is_none());
            assert_eq!(avatar_url.as_deref(), Some("https://cdn.example/a.png"));
        }
        _ => panic!("expected profile subcommand"),
    }
}

#[test]
fn unavailable_keyring_falls_back_to_sign_in() {
    use crate::core::keyring::KeyringAccessError;

    let locked = KeyringAccessError::from(::keyring::Error::NoStorageAccess("locked".into()));
    assert!(matches!(auth::stored_refresh_token(Err(locked)), Ok(None)));

    let stored = auth::stored_refresh_token(Ok(Some("refresh".into()))).unwrap();
    assert_eq!(stored.as_deref(), Some("refresh"));

    let broken = KeyringAccessError::from(::keyring::Error::Invalid(
        "service".into(),
        "empty".into(),
    ));
    assert!(auth::stored_refresh_token(Err(broken)).is_err());
}

#[test]
fn file_subcommands_take_numeric_ids() {
    match parse_args(&["ollamacode", "conversations", "files", "31"]).command {
        Some(Commands::Conversations {
            command: ConversationCommands::Files { message_id },
        }) => assert_eq!(message_id, 31),
        _ => panic!("expected conversations files"),
    }
    match parse_args(&["ollamacode", "conversations", "delete-file", "9"]).command {
        Some(Commands::Conversations {
            command: ConversationCommands::DeleteFile { id },
        }) => assert_eq!(id, 9),
        _ => panic!("expected conversations delete-file"),
    }
    assert!(Args::try_parse_from(["ollamacode", "conversations", "delete-file", "x"]).is_err());
}

#[test]
fn file_listing_shows_id_type_and_url() {
    let file = FileRecord {
        id: Some(4),
        message_id: 31,
        user_id: None,
        filename: "a.txt".into(),
        file_type: "text/plain".into(),
        file_size: 3,
        file_content: None,
        file_url: Some("https://cdn.example/a.txt".into()),
        created_at: None,
    };
    assert_eq!(
        format_file(&file),
        "📎 a.txt (3 Bytes) [file #4] text/plain\n   https://cdn.example/a.txt"
    );
}
