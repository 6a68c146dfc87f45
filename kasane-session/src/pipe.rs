//! r2pipe のトランスポート
//!
//! コマンドは改行で終端して送り、応答は NUL バイトまで読み取ります。
//! パイプラインはなく、1コマンドごとに応答を待ちます。

use crate::{Result, SessionError};
use nix::fcntl::{fcntl, FcntlArg};
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::io::{FromRawFd, RawFd};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use tracing::{debug, info, warn};

/// セッションから読み取るディスクリプタを示す環境変数
const R2PIPE_IN: &str = "R2PIPE_IN";
/// セッションへ書き込むディスクリプタを示す環境変数
const R2PIPE_OUT: &str = "R2PIPE_OUT";

/// 同期的なコマンドチャネル
///
/// 1つのチャネルを同時に複数の操作で使ってはいけません。
pub trait Channel {
    /// コマンドを送り、応答を待つ
    fn exchange(&mut self, command: &str) -> Result<String>;
}

impl<C: Channel + ?Sized> Channel for &mut C {
    fn exchange(&mut self, command: &str) -> Result<String> {
        (**self).exchange(command)
    }
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn exchange(&mut self, command: &str) -> Result<String> {
        (**self).exchange(command)
    }
}

/// セッションの中から起動されたかどうか
pub fn in_session() -> bool {
    std::env::var_os(R2PIPE_IN).is_some() && std::env::var_os(R2PIPE_OUT).is_some()
}

/// パイプ越しのチャネル
pub struct PipeChannel {
    writer: Box<dyn Write>,
    reader: BufReader<Box<dyn Read>>,
    /// 自分で起動したセッションプロセス
    child: Option<Child>,
}

impl PipeChannel {
    /// 任意のストリームからチャネルを作成する
    pub fn new(reader: impl Read + 'static, writer: impl Write + 'static) -> Self {
        Self {
            writer: Box::new(writer),
            reader: BufReader::new(Box::new(reader)),
            child: None,
        }
    }

    /// 親のセッションから継承したパイプに接続する
    ///
    /// `R2PIPE_IN` から応答を読み、`R2PIPE_OUT` にコマンドを書き込みます。
    pub fn from_env() -> Result<Self> {
        let input = env_fd(R2PIPE_IN)?;
        let output = env_fd(R2PIPE_OUT)?;

        // SAFETY: どちらのディスクリプタも fcntl(F_GETFD) で開いていることを確認済みで、
        // このプロセスでは他に所有者がいない
        let (reader, writer) = unsafe { (File::from_raw_fd(input), File::from_raw_fd(output)) };

        debug!("connected to session pipe (in={}, out={})", input, output);
        Ok(Self::new(reader, writer))
    }

    /// `r2 -q0 <path>` を起動して接続する
    pub fn spawn<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut child = Command::new("r2")
            .arg("-q0")
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::Protocol("session stdin is not piped".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::Protocol("session stdout is not piped".to_string()))?;

        let mut channel = Self::new(stdout, stdin);
        channel.child = Some(child);

        // 起動完了を示す NUL を読み捨てる
        channel.read_reply()?;
        info!("spawned r2 session for {}", path.display());
        Ok(channel)
    }

    fn read_reply(&mut self) -> Result<String> {
        read_reply(&mut self.reader)
    }
}

impl Channel for PipeChannel {
    fn exchange(&mut self, command: &str) -> Result<String> {
        debug!("session <- {}", command);
        self.writer.write_all(command.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.read_reply()
    }
}

impl Drop for PipeChannel {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = self.writer.write_all(b"q!\n");
            let _ = self.writer.flush();
            if let Err(e) = child.wait() {
                warn!("failed to wait for session process: {}", e);
            }
        }
    }
}

/// NUL までを1つの応答として読み取る
fn read_reply<R: BufRead>(reader: &mut R) -> Result<String> {
    let mut buf = Vec::new();
    let n = reader.read_until(0, &mut buf)?;
    if n == 0 || buf.last() != Some(&0) {
        return Err(SessionError::Protocol(
            "session closed the pipe before replying".to_string(),
        ));
    }
    buf.pop();
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// 環境変数からディスクリプタ番号を取得して検証する
fn env_fd(name: &str) -> Result<RawFd> {
    let value = std::env::var(name).map_err(|_| {
        SessionError::Protocol(format!("{} is not set; not running inside a session", name))
    })?;
    let fd: RawFd = value
        .trim()
        .parse()
        .map_err(|_| SessionError::Protocol(format!("{} is not a descriptor: {:?}", name, value)))?;
    fcntl(fd, FcntlArg::F_GETFD).map_err(|source| SessionError::Descriptor { fd, source })?;
    Ok(fd)
}
