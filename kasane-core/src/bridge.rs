//! 初期解析
//!
//! バージョン判定、アドレス補正、関数・メソッド・型のシンボル登録、
//! 解析コマンドの実行をまとめて行います。

use crate::applier::{ApplyReport, SymbolApplier};
use crate::config::Config;
use crate::correction::detect_correction;
use crate::Result;
use kasane_meta::{MetaError, MetadataProvider};
use kasane_session::{Channel, Session};
use tracing::{info, warn};

/// 初期解析の結果
#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    /// 判定した（または仮定した）コンパイラバージョン
    pub compiler_version: Option<String>,
    /// バージョンを判定できず仮定値を使った
    pub assumed_version: bool,
    pub packages: usize,
    pub correction: u64,
    /// 関数・メソッドの登録結果
    pub functions: ApplyReport,
    /// 型の登録結果（型を取得できなければ `None`）
    pub types: Option<ApplyReport>,
}

/// セッションに全シンボルを登録する
///
/// パッケージの取得とセッションの失敗は中断、型の取得失敗は警告のみです。
/// 中断した場合も、それまでに登録したシンボルはセッションに残ります。
pub fn initial_analysis<C, P>(
    session: &mut Session<C>,
    provider: &mut P,
    config: &Config,
) -> Result<AnalysisReport>
where
    C: Channel,
    P: MetadataProvider + ?Sized,
{
    let mut report = AnalysisReport::default();

    match provider.compiler_version() {
        Ok(version) => {
            info!("compiler version: {}", version);
            report.compiler_version = Some(version.name);
        }
        Err(MetaError::MetadataUnavailable(reason)) => {
            warn!(
                "failed to determine the compiler version ({}), assuming {}",
                reason,
                config.assumed_go_version
            );
            provider.set_go_version(&config.assumed_go_version)?;
            report.compiler_version = Some(config.assumed_go_version.clone());
            report.assumed_version = true;
        }
        Err(e) => warn!("failed to determine the compiler version: {}", e),
    }

    let packages = provider.packages()?;
    report.packages = packages.all().count();
    info!("{} packages found", report.packages);

    report.correction = match provider.moduledata() {
        Ok(moduledata) => detect_correction(session, &moduledata)?,
        Err(e) => {
            warn!("moduledata unavailable ({}); no correction applied", e);
            0
        }
    };

    let mut applier = SymbolApplier::new(session, report.correction);
    report.functions = applier.apply_packages(packages.all());

    for command in &config.analysis_commands {
        info!("running analysis: {}", command);
        if let Err(e) = session.run(command) {
            warn!("analysis command `{}` failed: {}", command, e);
        }
    }

    match provider.types() {
        Ok(types) => {
            let mut applier = SymbolApplier::new(session, report.correction);
            report.types = Some(applier.apply_types(&types));
        }
        Err(e) => warn!("failed to get types: {}", e),
    }

    Ok(report)
}
