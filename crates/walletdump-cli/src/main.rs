//! walletdump - Extract password hashes and key dumps from Bitcoin Core wallets
//!
//! This tool reads `wallet.dat` files in either the Berkeley DB or the SQLite
//! format and prints a `$bitcoin$` hash line for the encrypted master key, or
//! a detailed report of every key and address label found.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;
use walletdump_core::{DetailReport, ScanConfig, WalletScanner, DEFAULT_MAX_FIELD_LEN};

/// Extract password hashes and key dumps from Bitcoin Core wallet files
#[derive(Parser, Debug)]
#[command(name = "walletdump")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Wallet files to process (default: every *.dat file in the current directory)
    files: Vec<PathBuf>,

    /// Print a detailed report instead of the hash line
    #[arg(long)]
    details: bool,

    /// Prefix each hash line with the wallet path
    #[arg(long)]
    with_filename: bool,

    /// Maximum length of a single record field in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FIELD_LEN)]
    max_field_len: usize,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn scanner(&self) -> WalletScanner {
        let config = ScanConfig::new()
            .max_field_len(self.max_field_len)
            .master_key_only(!self.details);
        WalletScanner::with_config(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let files = if cli.files.is_empty() {
        collect_candidates(Path::new("."))?
    } else {
        cli.files.clone()
    };

    let processed = process_files(&cli, &files, &mut io::stdout().lock())?;
    info!("Processed {} of {} wallet file(s)", processed, files.len());
    Ok(())
}

/// Process every wallet, writing hash lines or reports to `out`
fn process_files(cli: &Cli, files: &[PathBuf], out: &mut impl Write) -> Result<usize> {
    let scanner = cli.scanner();
    let mut processed = 0;
    for path in files {
        match process_wallet(cli, &scanner, path) {
            Ok(output) => {
                if cli.details && processed > 0 {
                    writeln!(out)?;
                }
                out.write_all(output.as_bytes())?;
                processed += 1;
            }
            // Log error but continue with other files
            Err(e) => warn!("{:#}", e),
        }
    }
    Ok(processed)
}

/// Find wallet candidates directly inside `directory`
fn collect_candidates(directory: &Path) -> Result<Vec<PathBuf>> {
    debug!("Scanning directory: {}", directory.display());

    let mut candidates = Vec::new();
    for entry in WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry
            .with_context(|| format!("Failed to read directory: {}", directory.display()))?;
        let path = entry.path();

        if !path.is_file() || !is_wallet_candidate(path) {
            trace!("Skipping {}", path.display());
            continue;
        }
        candidates.push(path.to_path_buf());
    }

    if candidates.is_empty() {
        bail!("No .dat files found in {}", directory.display());
    }
    Ok(candidates)
}

fn is_wallet_candidate(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_ascii_lowercase().ends_with(".dat"))
        .unwrap_or(false)
}

/// Scan one wallet and render its output
fn process_wallet(cli: &Cli, scanner: &WalletScanner, path: &Path) -> Result<String> {
    let scan = scanner
        .scan_file(path)
        .with_context(|| format!("Failed to open wallet: {}", path.display()))?;

    if cli.details {
        return Ok(DetailReport::new(&scan).with_path(path).to_string());
    }

    let line = scan
        .model
        .hash_line()
        .with_context(|| format!("No hash for {}", path.display()))?;

    if cli.with_filename {
        Ok(format!("{}: {}\n", path.display(), line))
    } else {
        Ok(format!("{}\n", line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::{params, Connection};
    use std::fs;
    use tempfile::TempDir;

    fn push_field(out: &mut Vec<u8>, data: &[u8]) {
        out.push(data.len() as u8);
        out.extend_from_slice(data);
    }

    fn sqlite_wallet(dir: &TempDir, file: &str, method: u32) -> PathBuf {
        let mut key = Vec::new();
        push_field(&mut key, b"mkey");
        key.extend_from_slice(&1u32.to_le_bytes());

        let mut value = Vec::new();
        push_field(&mut value, &[0xAB; 48]);
        push_field(&mut value, &[0x01, 0x02, 0x03, 0x04]);
        value.extend_from_slice(&method.to_le_bytes());
        value.extend_from_slice(&25_000u32.to_le_bytes());

        let path = dir.path().join(file);
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE main (key BLOB PRIMARY KEY, value BLOB);")
            .unwrap();
        conn.execute(
            "INSERT INTO main (key, value) VALUES (?1, ?2)",
            params![key, value],
        )
        .unwrap();
        path
    }

    fn berkeley_page(kind: u8) -> Vec<u8> {
        let mut page = vec![0u8; 512];
        page[25] = kind;
        page
    }

    fn berkeley_meta(flags: u32, root: u32) -> Vec<u8> {
        let mut page = berkeley_page(9);
        page[12..16].copy_from_slice(&0x0005_3162u32.to_le_bytes());
        page[20..24].copy_from_slice(&512u32.to_le_bytes());
        page[48..52].copy_from_slice(&flags.to_le_bytes());
        page[88..92].copy_from_slice(&root.to_le_bytes());
        page
    }

    fn berkeley_leaf(items: &[&[u8]]) -> Vec<u8> {
        let mut page = berkeley_page(5);
        page[20..22].copy_from_slice(&(items.len() as u16).to_le_bytes());
        let mut top = page.len();
        for (i, item) in items.iter().enumerate() {
            top -= 3 + item.len();
            page[top..top + 2].copy_from_slice(&(item.len() as u16).to_le_bytes());
            page[top + 2] = 1;
            page[top + 3..top + 3 + item.len()].copy_from_slice(item);
            page[26 + 2 * i..28 + 2 * i].copy_from_slice(&(top as u16).to_le_bytes());
        }
        page
    }

    /// Legacy wallet: master database naming `main` at page 2, one leaf holding `mkey`
    fn berkeley_wallet(dir: &TempDir, file: &str) -> PathBuf {
        let mut key = vec![4u8];
        key.extend_from_slice(b"mkey");
        key.extend_from_slice(&1u32.to_le_bytes());

        let mut value = Vec::new();
        push_field(&mut value, &(0u8..40).collect::<Vec<u8>>());
        push_field(&mut value, &[0xDE, 0xAD, 0xBE, 0xEF]);
        value.extend_from_slice(&0u32.to_le_bytes());
        value.extend_from_slice(&25_000u32.to_le_bytes());

        let image = [
            berkeley_meta(0x20, 1),
            berkeley_leaf(&[&b"main"[..], &2u32.to_be_bytes()[..]]),
            berkeley_meta(0, 3),
            berkeley_leaf(&[key.as_slice(), value.as_slice()]),
        ]
        .concat();

        let path = dir.path().join(file);
        fs::write(&path, image).unwrap();
        path
    }

    fn hex_lower(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn run(args: &[&str], path: &Path) -> Result<String> {
        let mut argv = vec!["walletdump"];
        argv.extend_from_slice(args);
        let cli = Cli::parse_from(argv);
        process_wallet(&cli, &cli.scanner(), path)
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_hash_mode_config() {
        let cli = Cli::parse_from(["walletdump", "--max-field-len", "1024", "a.dat"]);
        assert_eq!(cli.files, vec![PathBuf::from("a.dat")]);
        assert_eq!(cli.max_field_len, 1024);
        assert!(!cli.details);
    }

    #[test]
    fn test_is_wallet_candidate() {
        assert!(is_wallet_candidate(Path::new("wallet.dat")));
        assert!(is_wallet_candidate(Path::new("/tmp/BACKUP.DAT")));
        assert!(!is_wallet_candidate(Path::new("wallet.dat.bak")));
        assert!(!is_wallet_candidate(Path::new("notes.txt")));
    }

    #[test]
    fn test_collect_candidates() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("wallet.dat"), b"x").unwrap();
        fs::write(dir.path().join("Old.DAT"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("inner.dat"), b"x").unwrap();

        let found = collect_candidates(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Old.DAT", "wallet.dat"]);
    }

    #[test]
    fn test_collect_candidates_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("readme.md"), b"x").unwrap();
        assert!(collect_candidates(dir.path()).is_err());
    }

    #[test]
    fn test_hash_line_from_sqlite_wallet() {
        let dir = TempDir::new().unwrap();
        let path = sqlite_wallet(&dir, "wallet.dat", 0);

        let output = run(&[], &path).unwrap();
        assert_eq!(
            output,
            format!(
                "$bitcoin$64${}$8$01020304$25000$2$00$2$00\n",
                "ab".repeat(32)
            )
        );

        let prefixed = run(&["--with-filename"], &path).unwrap();
        assert!(prefixed.starts_with(&format!("{}: $bitcoin$64$", path.display())));
    }

    #[test]
    fn test_hash_line_from_berkeley_wallet() {
        let dir = TempDir::new().unwrap();
        let path = berkeley_wallet(&dir, "wallet.dat");
        let master: Vec<u8> = (8u8..40).collect();

        let output = run(&[], &path).unwrap();
        assert_eq!(
            output,
            format!(
                "$bitcoin$64${}$8$deadbeef$25000$2$00$2$00\n",
                hex_lower(&master)
            )
        );

        let report = run(&["--details"], &path).unwrap();
        assert!(report.contains("Backend: berkeley-db\n"));
    }

    #[test]
    fn test_details_separator_skips_failed_files() {
        let dir = TempDir::new().unwrap();
        let files = vec![
            dir.path().join("missing.dat"),
            sqlite_wallet(&dir, "first.dat", 0),
            berkeley_wallet(&dir, "second.dat"),
        ];
        let cli = Cli::parse_from(["walletdump", "--details"]);

        let mut out = Vec::new();
        let processed = process_files(&cli, &files, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(processed, 2);
        assert!(text.starts_with("File: "));
        assert_eq!(text.matches("\n\nFile: ").count(), 1);
    }

    #[test]
    fn test_unsupported_derivation_has_no_hash() {
        let dir = TempDir::new().unwrap();
        let path = sqlite_wallet(&dir, "wallet.dat", 2);

        assert!(run(&[], &path).is_err());

        let report = run(&["--details"], &path).unwrap();
        assert!(report.contains("Backend: sqlite\n"));
        assert!(report.contains("Derivation method: 2\n"));
        assert!(report.contains("Iterations: 25000\n"));
    }

    #[test]
    fn test_unreadable_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.dat");
        fs::write(&path, vec![0x42; 4096]).unwrap();

        let err = run(&[], &path).unwrap_err();
        assert!(err.to_string().contains("Failed to open wallet"));
    }
}
