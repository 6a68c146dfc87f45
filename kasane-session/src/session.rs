//! 型付きのセッションコマンド

use crate::{Channel, Result, SessionError};
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

/// `pdfj` が返す関数
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub addr: u64,
    #[serde(default)]
    pub ops: Vec<Operation>,
}

impl FunctionInfo {
    /// 命令アドレスを順に返す
    pub fn offsets(&self) -> impl Iterator<Item = u64> + '_ {
        self.ops.iter().filter_map(|op| op.offset)
    }
}

/// 逆アセンブル結果の1命令
#[derive(Debug, Clone, Deserialize)]
pub struct Operation {
    /// 不正な命令では欠けることがある
    #[serde(default)]
    pub offset: Option<u64>,
}

/// `iSj` が返すセクション
#[derive(Debug, Clone, Deserialize)]
pub struct SectionInfo {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub vsize: u64,
    #[serde(default)]
    pub perm: String,
    #[serde(default)]
    pub paddr: u64,
    #[serde(default)]
    pub vaddr: u64,
}

impl SectionInfo {
    pub fn is_executable(&self) -> bool {
        self.perm.contains('x')
    }
}

/// `oj` が返す開いているファイル
#[derive(Debug, Clone, Deserialize)]
pub struct OpenFile {
    #[serde(default)]
    pub fd: i64,
    pub uri: String,
    #[serde(default)]
    pub raised: bool,
    #[serde(default)]
    pub writable: bool,
    #[serde(default)]
    pub size: u64,
}

/// 解析セッション
///
/// コマンドは1つずつ送信され、応答を受け取るまでブロックします。
pub struct Session<C: Channel> {
    channel: C,
}

impl<C: Channel> Session<C> {
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// コマンドを実行して応答をそのまま返す
    pub fn run(&mut self, command: &str) -> Result<String> {
        self.channel.exchange(command)
    }

    /// コマンドを実行してJSON応答をデコードする
    pub fn run_json<T: DeserializeOwned>(&mut self, command: &str) -> Result<T> {
        let reply = self.run(command)?;
        serde_json::from_str(reply.trim()).map_err(|source| SessionError::Json {
            command: command.to_string(),
            source,
        })
    }

    /// フラグを定義する
    pub fn new_flag(&mut self, name: &str, addr: u64) -> Result<()> {
        self.run(&format!("f {} @ 0x{:x}", name, addr))?;
        Ok(())
    }

    /// 長さ付きのフラグを定義する
    pub fn new_flag_with_length(&mut self, name: &str, addr: u64, length: u64) -> Result<()> {
        self.run(&format!("f {} {} @ 0x{:x}", name, length, addr))?;
        Ok(())
    }

    /// コメントを追加する（本文は base64 で渡す）
    pub fn add_comment(&mut self, addr: u64, text: &str) -> Result<()> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(text);
        self.run(&format!("CCu base64:{} @ 0x{:x}", encoded, addr))?;
        Ok(())
    }

    /// フラグ空間を切り替える
    pub fn switch_flagspace(&mut self, name: &str) -> Result<()> {
        self.run(&format!("fs {}", name))?;
        Ok(())
    }

    /// 既定のフラグ空間に戻す
    pub fn restore_default_flagspace(&mut self) -> Result<()> {
        self.run("fs *")?;
        Ok(())
    }

    /// 現在選択されている関数
    ///
    /// 応答が空、または関数として解釈できなければ `NoActiveFunction`。
    pub fn current_function(&mut self) -> Result<FunctionInfo> {
        let reply = self.run("pdfj")?;
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(SessionError::NoActiveFunction);
        }
        serde_json::from_str(reply).map_err(|e| {
            debug!("pdfj reply is not a function: {}", e);
            SessionError::NoActiveFunction
        })
    }

    /// ローダーから見たセクション一覧
    pub fn sections(&mut self) -> Result<Vec<SectionInfo>> {
        self.run_json("iSj")
    }

    /// 現在アクティブなファイル
    pub fn active_open_file(&mut self) -> Result<OpenFile> {
        let files: Vec<OpenFile> = self.run_json("oj")?;
        files
            .into_iter()
            .find(|f| f.raised)
            .ok_or_else(|| SessionError::Protocol("no active file in the session".to_string()))
    }

    /// メモリを読み取る
    ///
    /// キャッシュはせず、呼び出しごとにセッションへ問い合わせます。
    pub fn read_memory(&mut self, addr: u64, len: usize) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }

        let command = format!("p8 {} @ 0x{:x}", len, addr);
        let reply = self.run(&command)?;
        let bytes = hex::decode(reply.trim()).map_err(|source| SessionError::Hex {
            command: command.clone(),
            source,
        })?;
        if bytes.len() != len {
            return Err(SessionError::Protocol(format!(
                "`{}` returned {} bytes",
                command,
                bytes.len()
            )));
        }
        Ok(bytes)
    }
}
