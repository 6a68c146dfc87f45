//! Kasane CLI - コマンドラインインターフェース
//!
//! Goバイナリのメタデータを表示し、radare2 セッションへシンボルと行情報を投影する

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use kasane_core::parse::{parse_address, parse_count};
use kasane_core::resolve::{interface_def, method_def, struct_def};
use kasane_core::{
    annotate_current_function, detect_correction, initial_analysis, read_string_array,
    render_type, Command, Config, CorrectedLookup, LineMode, PackageFilter, TypeResolver,
};
use kasane_meta::symbols::classify;
use kasane_meta::{
    GoFile, MetaError, MetadataProvider, Package, PackageClass, SectionKind, TypeKind,
};
use kasane_session::{in_session, Channel, PipeChannel, Session};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Kasane - Go metadata bridge for radare2
#[derive(Parser)]
#[command(name = "kasane")]
#[command(version)]
#[command(about = "Recover Go metadata and project it into a radare2 session", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: KasaneCommand,
}

/// パッケージ分類のフィルタ
#[derive(Args, Clone, Copy)]
struct FilterArgs {
    /// Include standard library packages
    #[arg(short, long)]
    std: bool,

    /// Include 3rd party/vendor packages
    #[arg(long)]
    vendor: bool,

    /// Include unidentified packages
    #[arg(short, long)]
    unknown: bool,
}

impl From<FilterArgs> for PackageFilter {
    fn from(args: FilterArgs) -> Self {
        PackageFilter {
            std: args.std,
            vendor: args.vendor,
            unknown: args.unknown,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum TypeFilter {
    Struct,
    Interface,
    All,
}

#[derive(Subcommand)]
enum KasaneCommand {
    /// Print summary information
    Info {
        /// Path to the Go binary
        file: PathBuf,
    },

    /// List packages
    Packages {
        file: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,

        /// Include the package's filepath
        #[arg(short, long)]
        filepath: bool,
    },

    /// List types
    Types {
        /// Which kinds of types to list
        #[arg(value_enum)]
        kind: TypeFilter,

        file: PathBuf,

        /// Include standard library types
        #[arg(short, long)]
        std: bool,

        /// Include 3rd party/vendor types
        #[arg(long)]
        vendor: bool,

        /// Include method definitions
        #[arg(short, long)]
        methods: bool,

        /// Fallback compiler version
        #[arg(long)]
        go_version: Option<String>,
    },

    /// Print the type at the given address
    TypeAt {
        address: String,

        file: PathBuf,

        /// Include method definitions
        #[arg(short, long)]
        methods: bool,

        /// Fallback compiler version
        #[arg(long)]
        go_version: Option<String>,
    },

    /// Source code projection
    Source {
        file: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,

        /// Include the following packages
        #[arg(short, long, value_delimiter = ',')]
        include: Vec<String>,
    },

    /// Display sections extracted from the moduledata structure
    Moduledata {
        file: PathBuf,

        /// Dump the contents of a section to standard out
        #[arg(long, value_name = "SECTION")]
        dump: Option<String>,
    },

    /// Run inside an r2 session (r2pipe)
    R2 {
        #[command(subcommand)]
        action: R2Command,
    },

    /// Spawn an r2 session for a file and start an interactive shell
    Shell {
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum R2Command {
    /// Apply function, method and type symbols
    Init,

    /// Annotate the current function with source lines
    Lines {
        /// Add flags in a dedicated flagspace instead of comments
        #[arg(long)]
        flags: bool,
    },

    /// Print the type at the given address
    Type {
        address: String,

        /// Include method definitions
        #[arg(short, long)]
        methods: bool,
    },

    /// Print a string slice
    Strings {
        address: String,
        count: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        KasaneCommand::Info { file } => handle_info(&file),
        KasaneCommand::Packages {
            file,
            filter,
            filepath,
        } => handle_packages(&file, &filter_config(filter), filepath),
        KasaneCommand::Types {
            kind,
            file,
            std,
            vendor,
            methods,
            go_version,
        } => handle_types(&file, kind, std, vendor, methods, go_version.as_deref()),
        KasaneCommand::TypeAt {
            address,
            file,
            methods,
            go_version,
        } => handle_type_at(&address, &file, methods, go_version.as_deref()),
        KasaneCommand::Source {
            file,
            filter,
            include,
        } => handle_source(&file, &filter_config(filter), &include),
        KasaneCommand::Moduledata { file, dump } => handle_moduledata(&file, dump.as_deref()),
        KasaneCommand::R2 { action } => handle_r2(action),
        KasaneCommand::Shell { file } => handle_shell(&file),
    }
}

/// パッケージフィルタだけを指定した設定
fn filter_config(filter: FilterArgs) -> Config {
    Config {
        packages: filter.into(),
        ..Config::default()
    }
}

/// ログ出力を初期化する（`RUST_LOG` が優先）
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open(path: &Path) -> Result<GoFile> {
    GoFile::open(path).with_context(|| format!("Error when opening {}", path.display()))
}

/// バージョンを強制する、または判定できなければ仮定値を使う
fn ensure_version(file: &mut GoFile, forced: Option<&str>) -> Result<()> {
    if let Some(version) = forced {
        file.set_go_version(version)
            .context("Error when setting the assumed Go version")?;
        return Ok(());
    }

    if let Err(MetaError::MetadataUnavailable(_)) = file.compiler_version() {
        let assumed = Config::default().assumed_go_version;
        println!("Failed to determine the compiler version, assuming {}", assumed);
        file.set_go_version(&assumed)?;
    }
    Ok(())
}

/// Infoコマンドを処理する
fn handle_info(path: &Path) -> Result<()> {
    let file = open(path)?;
    let info = file.file_info();

    let mut rows: Vec<(&str, String)> = vec![
        ("File", file.path().display().to_string()),
        ("OS", info.os.clone()),
        ("Arch", info.arch.clone()),
    ];

    if let Ok(version) = file.compiler_version() {
        rows.push((
            "Compiler",
            version.name.trim_start_matches("go").to_string(),
        ));
    }
    if let Some(build_id) = file.build_id() {
        rows.push(("Build ID", build_id));
    }

    match file.packages() {
        Ok(packages) => {
            if let Some(root) = packages.main_root() {
                rows.push(("Main root", root.to_string()));
            }
            rows.push(("# main", packages.main().len().to_string()));
            rows.push(("# std", packages.std().len().to_string()));
            rows.push(("# vendor", packages.vendors().len().to_string()));
            if !packages.unknown().is_empty() {
                rows.push(("# unknown", packages.unknown().len().to_string()));
            }
        }
        Err(e) => warn!("failed to parse packages: {}", e),
    }

    for (key, value) in rows {
        println!("{:<10} {}", key, value);
    }
    Ok(())
}

/// Packagesコマンドを処理する
fn handle_packages(path: &Path, config: &Config, filepath: bool) -> Result<()> {
    let file = open(path)?;
    let packages = file.packages().context("Error when parsing packages")?;

    // パッケージの取得に成功したので、以降の分類済み一覧は失敗しない
    let tables = [
        ("Packages", PackageClass::Main, packages.main()),
        ("Vendors", PackageClass::Vendor, packages.vendors()),
        ("Standard Library Packages", PackageClass::Std, packages.std()),
        ("Unknown Packages", PackageClass::Unknown, packages.unknown()),
    ];
    for (header, class, list) in tables {
        if config.packages.includes(class) {
            print_packages(header, list, filepath);
        }
    }
    Ok(())
}

/// パッケージの表を表示するヘルパー関数
fn print_packages(header: &str, packages: &[Package], filepath: bool) {
    println!("{}:", header);

    let mut packages: Vec<&Package> = packages.iter().collect();
    packages.sort_by(|a, b| a.name.cmp(&b.name));

    let name_width = packages.iter().map(|p| p.name.len()).max().unwrap_or(0).max(4);
    let version_width = packages
        .iter()
        .filter_map(|p| p.version())
        .map(str::len)
        .max()
        .unwrap_or(0)
        .max(7);

    if filepath {
        println!("{:<name_width$}  {:<version_width$}  Path", "Name", "Version");
    } else {
        println!("{:<name_width$}  Version", "Name");
    }

    for p in packages {
        let version = p.version().unwrap_or("");
        if filepath {
            println!("{:<name_width$}  {:<version_width$}  {}", p.name, version, p.filepath);
        } else {
            println!("{:<name_width$}  {}", p.name, version);
        }
    }
    println!();
}

/// 標準ライブラリのパッケージパスかどうか
fn is_std_path(package_path: &str) -> bool {
    !package_path.is_empty() && classify(package_path, "", None) == PackageClass::Std
}

/// Typesコマンドを処理する
fn handle_types(
    path: &Path,
    filter: TypeFilter,
    std: bool,
    vendor: bool,
    methods: bool,
    go_version: Option<&str>,
) -> Result<()> {
    let mut file = open(path)?;
    ensure_version(&mut file, go_version)?;
    let types = file.types().context("Error when enumerating types")?;

    for typ in &types {
        if !vendor && typ.package_path.contains("/vendor/") {
            continue;
        }
        if !std
            && (is_std_path(&typ.package_path)
                || typ.name.starts_with("map.")
                || typ.name.starts_with("*map."))
        {
            continue;
        }

        let rendered = match (&typ.kind, filter) {
            (TypeKind::Struct(fields), TypeFilter::Struct) => {
                let mut out = struct_def(typ, fields);
                if methods && !typ.methods.is_empty() {
                    out.push('\n');
                    out.push_str(&method_def(typ));
                }
                out
            }
            (TypeKind::Interface(iface), TypeFilter::Interface) => interface_def(typ, iface.as_deref()),
            (TypeKind::Interface(_), TypeFilter::All) => render_type(typ, false),
            (_, TypeFilter::All) => render_type(typ, methods),
            _ => continue,
        };
        println!("{}\n", rendered);
    }
    Ok(())
}

/// TypeAtコマンドを処理する
fn handle_type_at(
    address: &str,
    path: &Path,
    methods: bool,
    go_version: Option<&str>,
) -> Result<()> {
    let addr = parse_address(address).context("Bad address format")?;
    let mut file = open(path)?;
    ensure_version(&mut file, go_version)?;

    let types = file.types().context("Error when looking up the type")?;
    match TypeResolver::new(&types).require(addr, methods) {
        Ok(definition) => println!("{}", definition),
        Err(e) => eprintln!("Error: {}", e),
    }
    Ok(())
}

/// Sourceコマンドを処理する
fn handle_source(path: &Path, config: &Config, include: &[String]) -> Result<()> {
    let file = open(path)?;
    let packages = file.packages().context("Error when parsing packages")?;
    let lookup = file.line_lookup()?;

    let selected = packages.all().filter(|p| {
        config.packages.includes(p.class) || include.iter().any(|name| *name == p.name)
    });

    for (i, pkg) in selected.enumerate() {
        if i != 0 {
            println!();
        }
        println!("Package {}: {}", pkg.name, pkg.filepath);
        for source_file in pkg.source_files(lookup) {
            println!("{}", source_file);
        }
    }
    Ok(())
}

/// Moduledataコマンドを処理する
fn handle_moduledata(path: &Path, dump: Option<&str>) -> Result<()> {
    let file = open(path)?;
    let moduledata = file
        .moduledata()
        .context("Could not retrieve the file's moduledata")?;

    let Some(name) = dump else {
        println!("{:<10} {:<18} Size", "Section", "Address");
        for (kind, section) in moduledata.iter() {
            println!(
                "{:<10} {:<18} 0x{:x}",
                kind,
                format!("0x{:x}", section.address),
                section.length
            );
        }
        return Ok(());
    };

    let kind: SectionKind = match name.parse() {
        Ok(kind) => kind,
        Err(e) => {
            eprintln!("{}.", e);
            return Ok(());
        }
    };
    let section = moduledata.section(kind);
    if section.length == 0 {
        eprintln!("Section {} is empty.", kind);
        return Ok(());
    }

    let length = usize::try_from(section.length)?;
    match file.bytes(section.address, length) {
        Ok(data) => std::io::stdout().write_all(&data)?,
        Err(e) => eprintln!("Error when getting the section data: {}.", e),
    }
    Ok(())
}

/// R2コマンドを処理する（セッションの中から起動される）
fn handle_r2(action: R2Command) -> Result<()> {
    if !in_session() {
        bail!("kasane r2 must be run from inside an r2 session (e.g. `#!pipe kasane r2 init`)");
    }
    let channel = PipeChannel::from_env().context("Failed to connect to the r2 session")?;
    let mut session = Session::new(channel);

    let active = session
        .active_open_file()
        .context("Error when getting current open file")?;
    let path = active.uri.strip_prefix("file://").unwrap_or(&active.uri).to_string();
    let mut file = open(Path::new(&path))?;

    let mut config = Config::default();
    let command = match action {
        R2Command::Init => Command::Init,
        R2Command::Lines { flags } => Command::Lines { flags },
        R2Command::Type { address, methods } => {
            config.print_methods = methods;
            Command::Type(parse_address(&address).context("Failed to parse address argument")?)
        }
        R2Command::Strings { address, count } => Command::Strings {
            address: parse_address(&address).context("Failed to parse address argument")?,
            count: parse_count(&count).context("Failed to parse length argument")?,
        },
    };

    handle_command(&mut session, &mut file, command, &config)?;
    Ok(())
}

/// Shellコマンドを処理する
fn handle_shell(path: &Path) -> Result<()> {
    let mut file = open(path)?;
    let channel = PipeChannel::spawn(path).context("Failed to start r2")?;
    let mut session = Session::new(channel);
    let config = Config::default();

    println!("Kasane - Go metadata bridge for radare2");
    println!("Loaded {}", path.display());
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    run_repl(&mut session, &mut file, &config)
}

/// REPLループを実行する
fn run_repl<C: Channel>(session: &mut Session<C>, file: &mut GoFile, config: &Config) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline("(kasane) ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                let Some(command) = Command::parse(line) else {
                    println!("Unknown command: {}", line);
                    println!("Type 'help' for available commands.");
                    continue;
                };

                match handle_command(session, file, command, config) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => eprintln!("Error: {:#}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

/// セッションに対するコマンドを実行する（`Quit` なら false）
fn handle_command<C: Channel>(
    session: &mut Session<C>,
    file: &mut GoFile,
    command: Command,
    config: &Config,
) -> Result<bool> {
    match command {
        Command::Init => handle_init(session, file, config)?,
        Command::Lines { flags } => handle_lines(session, file, flags, config)?,
        Command::Type(addr) => handle_session_type(session, file, addr, config)?,
        Command::Strings { address, count } => handle_strings(session, file, address, count),
        Command::Sections => handle_sections(session)?,
        Command::Help => print_help(),
        Command::Quit => {
            println!("Goodbye!");
            return Ok(false);
        }
    }
    Ok(true)
}

/// 補正値を求める（moduledata がなければ補正なし）
fn current_correction<C: Channel>(session: &mut Session<C>, file: &GoFile) -> Result<u64> {
    match file.moduledata() {
        Ok(moduledata) => Ok(detect_correction(session, &moduledata)?),
        Err(e) => {
            warn!("moduledata unavailable ({}); no correction applied", e);
            Ok(0)
        }
    }
}

/// Initコマンドを処理する
fn handle_init<C: Channel>(session: &mut Session<C>, file: &mut GoFile, config: &Config) -> Result<()> {
    let report = initial_analysis(session, file, config)?;

    match (&report.compiler_version, report.assumed_version) {
        (Some(version), true) => {
            println!("Failed to determine the compiler version, assuming {}", version)
        }
        (Some(version), false) => println!("Compiler version: {}", version),
        (None, _) => println!("Failed to determine the compiler version"),
    }
    if report.correction != 0 {
        println!("Address correction: 0x{:x}", report.correction);
    }
    println!("{} packages found.", report.packages);
    println!(
        "{} function symbols found",
        report.functions.functions + report.functions.methods
    );
    match report.types {
        Some(types) => println!("{} type symbols found", types.types),
        None => println!("Type symbols skipped"),
    }

    let failed = report.functions.failed + report.types.map(|t| t.failed).unwrap_or(0);
    if failed != 0 {
        eprintln!("{} symbols were rejected by the session", failed);
    }
    Ok(())
}

/// Linesコマンドを処理する
fn handle_lines<C: Channel>(
    session: &mut Session<C>,
    file: &GoFile,
    flags: bool,
    config: &Config,
) -> Result<()> {
    let config = Config {
        line_mode: if flags { LineMode::Flag } else { config.line_mode },
        ..config.clone()
    };

    let correction = current_correction(session, file)?;
    let lookup = CorrectedLookup::new(file.line_lookup()?, correction);
    let count = annotate_current_function(session, &lookup, &config)
        .context("Failed to annotate the current function")?;
    println!("{} source lines annotated", count);
    Ok(())
}

/// セッション内のTypeコマンドを処理する
fn handle_session_type<C: Channel>(
    session: &mut Session<C>,
    file: &mut GoFile,
    addr: u64,
    config: &Config,
) -> Result<()> {
    ensure_version(file, None)?;
    let types = file.types().context("Error when looking up the type")?;

    // セッション上のアドレスは補正済み
    let correction = current_correction(session, file)?;
    let resolver = TypeResolver::new(&types).with_correction(correction);

    match resolver.require(addr, config.print_methods) {
        Ok(definition) => println!("{}", definition),
        Err(e) => eprintln!("Error: {}", e),
    }
    Ok(())
}

/// Stringsコマンドを処理する
fn handle_strings<C: Channel>(session: &mut Session<C>, file: &GoFile, address: u64, count: u64) {
    let info = file.file_info().clone();
    for item in read_string_array(&mut *session, &info, address, count) {
        match item {
            Ok(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
    }
}

/// Sectionsコマンドを処理する
fn handle_sections<C: Channel>(session: &mut Session<C>) -> Result<()> {
    let sections = session.sections()?;
    let width = sections.iter().map(|s| s.name.len()).max().unwrap_or(0).max(4);

    println!("{:<width$}  {:<18} {:<10} Perm", "Name", "Address", "Size");
    for s in &sections {
        println!(
            "{:<width$}  {:<18} {:<10} {}",
            s.name,
            format!("0x{:x}", s.vaddr),
            format!("0x{:x}", s.vsize),
            s.perm
        );
    }
    Ok(())
}

fn print_help() {
    println!("Available commands:");
    println!();
    println!("  help                   - Show this help message");
    println!("  quit/exit/q            - Exit the shell");
    println!();
    println!("Session commands:");
    println!("  init                   - Apply function, method and type symbols");
    println!("  lines [flags]          - Annotate the current function with source lines");
    println!("  type <addr>            - Print the type at the given address");
    println!("  strings <addr> <count> - Print a string slice");
    println!("  sections               - List the sections seen by the session");
    println!();
    println!("Examples:");
    println!("  init");
    println!("  lines flags");
    println!("  type 0x4a0000");
    println!("  strings 0x4d2f00 3");
}
