//! セッションコマンドのテスト

use kasane_meta::{FileInfo, MemoryReader, MetaError, RunTimeEndian, WordSize};
use kasane_session::{Channel, Session, SessionError};
use std::collections::VecDeque;

/// 送信されたコマンドを記録し、用意した応答を順に返すチャネル
#[derive(Default)]
struct ScriptedChannel {
    sent: Vec<String>,
    replies: VecDeque<String>,
}

impl ScriptedChannel {
    fn with_replies(replies: &[&str]) -> Self {
        Self {
            sent: Vec::new(),
            replies: replies.iter().map(|r| r.to_string()).collect(),
        }
    }
}

impl Channel for ScriptedChannel {
    fn exchange(&mut self, command: &str) -> kasane_session::Result<String> {
        self.sent.push(command.to_string());
        Ok(self.replies.pop_front().unwrap_or_default())
    }
}

fn file_info() -> FileInfo {
    FileInfo {
        os: "linux".to_string(),
        arch: "amd64".to_string(),
        word_size: WordSize::Eight,
        byte_order: RunTimeEndian::Little,
    }
}

#[test]
fn test_flag_commands() {
    let mut session = Session::new(ScriptedChannel::default());
    session.new_flag("sym.type.main.T", 0x4a0000).unwrap();
    session.new_flag_with_length("fcn.main.main", 0x3000, 16).unwrap();
    session.switch_flagspace("go.lines").unwrap();
    session.restore_default_flagspace().unwrap();

    assert_eq!(
        session.channel().sent,
        vec![
            "f sym.type.main.T @ 0x4a0000",
            "f fcn.main.main 16 @ 0x3000",
            "fs go.lines",
            "fs *",
        ]
    );
}

#[test]
fn test_add_comment_is_base64() {
    let mut session = Session::new(ScriptedChannel::default());
    session.add_comment(0x10, "a.go:5").unwrap();
    assert_eq!(session.channel().sent, vec!["CCu base64:YS5nbzo1 @ 0x10"]);
}

#[test]
fn test_current_function() {
    let reply = r#"{"name":"main.main","addr":4096,"ops":[{"offset":4096},{"offset":4100},{"type":"invalid"}]}"#;
    let mut session = Session::new(ScriptedChannel::with_replies(&[reply]));
    let func = session.current_function().unwrap();
    assert_eq!(func.name, "main.main");
    assert_eq!(func.offsets().collect::<Vec<_>>(), vec![0x1000, 0x1004]);
}

#[test]
fn test_current_function_missing() {
    let mut session = Session::new(ScriptedChannel::with_replies(&["\n", "Cannot find function\n"]));
    assert!(matches!(
        session.current_function(),
        Err(SessionError::NoActiveFunction)
    ));
    assert!(matches!(
        session.current_function(),
        Err(SessionError::NoActiveFunction)
    ));
}

#[test]
fn test_sections_and_open_file() {
    let sections = r#"[{"name":".text","size":4096,"vsize":4096,"perm":"-r-x","paddr":4096,"vaddr":4198400},
                       {"name":".data","size":512,"vsize":512,"perm":"-rw-","paddr":8192,"vaddr":4210688}]"#;
    let files = r#"[{"raised":false,"fd":3,"uri":"malloc://512"},{"raised":true,"fd":4,"uri":"/tmp/hello","writable":false,"size":8192}]"#;
    let mut session = Session::new(ScriptedChannel::with_replies(&[sections, files]));

    let sections = session.sections().unwrap();
    assert_eq!(sections.len(), 2);
    assert!(sections[0].is_executable());
    assert!(!sections[1].is_executable());
    assert_eq!(sections[0].vaddr, 0x401000);

    let file = session.active_open_file().unwrap();
    assert_eq!(file.uri, "/tmp/hello");
    assert_eq!(file.fd, 4);
}

#[test]
fn test_invalid_json_reply() {
    let mut session = Session::new(ScriptedChannel::with_replies(&["not json"]));
    match session.sections() {
        Err(SessionError::Json { command, .. }) => assert_eq!(command, "iSj"),
        other => panic!("expected Json error, got {:?}", other.map(|s| s.len())),
    }
}

#[test]
fn test_read_memory_through_session() {
    let mut session = Session::new(ScriptedChannel::with_replies(&["0100000002000000\n"]));
    let word = session.read_word(0x5000, &file_info()).unwrap();
    assert_eq!(word, 0x0000_0002_0000_0001);
    assert_eq!(session.channel().sent, vec!["p8 8 @ 0x5000"]);
}

#[test]
fn test_read_memory_failure_is_memory_read_error() {
    let mut session = Session::new(ScriptedChannel::with_replies(&["zz"]));
    match session.read(0x5000, 1) {
        Err(MetaError::MemoryRead { address, .. }) => assert_eq!(address, 0x5000),
        other => panic!("expected MemoryRead, got {:?}", other),
    }
}

#[test]
fn test_read_memory_zero_length_sends_nothing() {
    let mut session = Session::new(ScriptedChannel::default());
    assert!(session.read_memory(0x5000, 0).unwrap().is_empty());
    assert!(session.channel().sent.is_empty());
}
