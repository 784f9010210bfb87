mod address;
mod output;
mod report;

use address::Address;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mantle_core::{
    BlobStore, Entry, FsStore, LocalFile, Metadata, NodeId, Trie, collect_local_files,
    normalize_folder,
};
use output::{
    AddOutput, DownloadOutput, EntryInfo, InitOutput, ListOutput, ManifestOutput, OutputWriter,
    SyncOutput,
};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Root metadata key naming the document served for the manifest root.
const INDEX_DOCUMENT_KEY: &str = "website-index-document";
/// Root metadata key naming the document served for missing paths.
const ERROR_DOCUMENT_KEY: &str = "website-error-document";

/// Mantle - content-addressed manifests
#[derive(Parser)]
#[command(name = "mantle")]
#[command(about = "Content-addressed manifests mapping paths to blob references", long_about = None)]
#[command(version)]
struct Cli {
    /// Store root directory (defaults to MANTLE_ROOT env var or ./mantle-store)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new store
    Init,

    /// Create an empty manifest
    Create,

    /// Add a file or directory to a manifest
    Add {
        /// Manifest reference, optionally followed by a folder (`<ref>/<folder>`)
        address: String,

        /// File or directory to add
        path: PathBuf,

        /// Store a single file under this name instead of its own
        #[arg(long = "as", value_name = "NAME")]
        as_name: Option<String>,

        /// Folder inside the manifest to add into
        #[arg(long)]
        folder: Option<String>,
    },

    /// Remove a file or a whole folder from a manifest
    Remove {
        /// `<ref>/<path>` of the file or folder
        address: String,
    },

    /// Bring a manifest in line with a local directory
    Sync {
        /// Manifest reference, optionally followed by a folder (`<ref>/<folder>`)
        address: String,

        /// Local directory to sync from
        dir: PathBuf,

        /// Delete manifest entries that are missing locally
        #[arg(long)]
        remove: bool,

        /// Folder inside the manifest to sync into
        #[arg(long)]
        folder: Option<String>,
    },

    /// Merge two manifests; entries of the second win on collisions
    Merge {
        /// Base manifest reference
        first: String,

        /// Manifest whose entries override the base
        second: String,
    },

    /// List entries, optionally below a path prefix
    List {
        /// `<ref>[/<prefix>]`
        address: String,

        /// Print entries as /bzz/<root>/<path> links
        #[arg(long, conflicts_with = "print_bytes")]
        print_bzz: bool,

        /// Print entries as /bytes/<reference> links
        #[arg(long)]
        print_bytes: bool,
    },

    /// Write entries to the local filesystem
    Download {
        /// `<ref>[/<prefix>]`
        address: String,

        /// Destination directory
        #[arg(default_value = ".")]
        dest: PathBuf,
    },

    /// Set the index and error documents of a manifest
    Index {
        /// Manifest reference
        address: String,

        /// Document served for the manifest root
        document: String,

        /// Document served for missing paths
        #[arg(long)]
        error: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let writer = OutputWriter::new(cli.json);

    // CLI arg > MANTLE_ROOT env var > ./mantle-store default
    let root = cli
        .root
        .or_else(|| std::env::var("MANTLE_ROOT").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("./mantle-store"));

    match run(&root, cli.command, &writer) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            debug!(error = ?err, "command failed");
            let report = report::render(&err);
            writer.write_error(&report);
            ExitCode::from(report.exit_code)
        }
    }
}

/// Log to stderr; `RUST_LOG` overrides the level picked by `-v`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(root: &Path, command: Commands, writer: &OutputWriter) -> Result<()> {
    match command {
        Commands::Init => cmd_init(root, writer),
        Commands::Create => cmd_create(root, writer),
        Commands::Add {
            address,
            path,
            as_name,
            folder,
        } => cmd_add(root, &address, &path, as_name.as_deref(), folder.as_deref(), writer),
        Commands::Remove { address } => cmd_remove(root, &address, writer),
        Commands::Sync {
            address,
            dir,
            remove,
            folder,
        } => cmd_sync(root, &address, &dir, remove, folder.as_deref(), writer),
        Commands::Merge { first, second } => cmd_merge(root, &first, &second, writer),
        Commands::List {
            address,
            print_bzz,
            print_bytes,
        } => {
            let style = if print_bzz {
                ListStyle::Bzz
            } else if print_bytes {
                ListStyle::Bytes
            } else {
                ListStyle::Plain
            };
            cmd_list(root, &address, style, writer)
        }
        Commands::Download { address, dest } => cmd_download(root, &address, &dest, writer),
        Commands::Index {
            address,
            document,
            error,
        } => cmd_index(root, &address, &document, error.as_deref(), writer),
    }
}

fn open_trie(root: &Path) -> Result<Trie<FsStore>> {
    let store =
        FsStore::open(root).with_context(|| format!("Failed to open store at {}", root.display()))?;
    Ok(Trie::new(store))
}

fn parse_address(input: &str) -> Result<Address> {
    Address::parse(input).with_context(|| format!("Invalid address: {}", input))
}

fn load_root(trie: &mut Trie<FsStore>, address: &Address) -> Result<NodeId> {
    trie.load(&address.reference)
        .with_context(|| format!("Failed to load manifest {}", address.reference))
}

/// Folder from the address path joined with an explicit `--folder`.
fn target_folder(address: &Address, folder: Option<&str>) -> String {
    let mut joined = normalize_folder(&address.path);
    if let Some(folder) = folder {
        joined.push_str(&normalize_folder(folder));
    }
    joined
}

fn entry_info(entry: Entry) -> EntryInfo {
    EntryInfo {
        path: entry.path,
        reference: entry.reference,
        metadata: entry.metadata,
    }
}

fn cmd_init(root: &Path, writer: &OutputWriter) -> Result<()> {
    let store = FsStore::init(root)
        .with_context(|| format!("Failed to initialize store at {}", root.display()))?;

    let output = InitOutput {
        success: true,
        result_code: 0,
        root: root.display().to_string(),
        algorithm: store.algorithm().as_str().to_string(),
    };
    writer.write(&output, || {
        format!(
            "Initialized mantle store at {}\nAlgorithm: {}\n",
            output.root, output.algorithm
        )
    })
}

fn cmd_create(root: &Path, writer: &OutputWriter) -> Result<()> {
    let mut trie = open_trie(root)?;
    let manifest = trie.create();
    let reference = trie.save(manifest).context("Failed to save manifest")?;

    let output = ManifestOutput {
        success: true,
        result_code: 0,
        reference,
        removed: None,
    };
    writer.write(&output, || format!("{}\n", reference))
}

fn cmd_add(
    root: &Path,
    address: &str,
    path: &Path,
    as_name: Option<&str>,
    folder: Option<&str>,
    writer: &OutputWriter,
) -> Result<()> {
    let address = parse_address(address)?;
    let folder = target_folder(&address, folder);
    let mut trie = open_trie(root)?;

    let files = match as_name {
        Some(name) => {
            if !path.is_file() {
                anyhow::bail!("--as requires a single file, got {}", path.display());
            }
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let reference = trie.store().put(&bytes).context("Failed to store file")?;
            let mut metadata = Metadata::new();
            metadata.insert(
                mantle_core::FILENAME_KEY.to_string(),
                name.rsplit('/').next().unwrap_or(name).to_string(),
            );
            vec![LocalFile {
                path: format!("{}{}", folder, name.trim_start_matches('/')),
                reference,
                metadata,
            }]
        }
        None => collect_local_files(trie.store(), path, Some(folder.as_str()))
            .with_context(|| format!("Failed to add path: {}", path.display()))?,
    };

    let mut manifest = load_root(&mut trie, &address)?;
    let mut entries = Vec::with_capacity(files.len());
    for file in files {
        manifest = trie
            .add(manifest, &file.path, file.reference, file.metadata.clone())
            .with_context(|| format!("Failed to add {}", file.path))?;
        entries.push(EntryInfo {
            path: file.path,
            reference: file.reference,
            metadata: file.metadata,
        });
    }
    let reference = trie.save(manifest).context("Failed to save manifest")?;

    let output = AddOutput {
        success: true,
        result_code: 0,
        reference,
        entries,
    };
    writer.write(&output, || {
        let mut text = String::new();
        for entry in &output.entries {
            let _ = writeln!(text, "{} {}", entry.reference, entry.path);
        }
        let _ = writeln!(text, "{}", reference);
        text
    })
}

fn cmd_remove(root: &Path, address: &str, writer: &OutputWriter) -> Result<()> {
    let address = parse_address(address)?;
    if address.path.is_empty() {
        anyhow::bail!("remove needs a path: <reference>/<path>");
    }

    let mut trie = open_trie(root)?;
    let manifest = load_root(&mut trie, &address)?;
    let (manifest, removed) = trie
        .remove_prefix(manifest, &address.path)
        .with_context(|| format!("Failed to remove {}", address.path))?;
    let reference = trie.save(manifest).context("Failed to save manifest")?;

    let output = ManifestOutput {
        success: true,
        result_code: 0,
        reference,
        removed: Some(removed),
    };
    writer.write(&output, || format!("{}\n", reference))
}

fn cmd_sync(
    root: &Path,
    address: &str,
    dir: &Path,
    remove: bool,
    folder: Option<&str>,
    writer: &OutputWriter,
) -> Result<()> {
    let address = parse_address(address)?;
    let folder = target_folder(&address, folder);
    let mut trie = open_trie(root)?;

    let files = collect_local_files(trie.store(), dir, Some(folder.as_str()))
        .with_context(|| format!("Failed to read {}", dir.display()))?;
    let manifest = load_root(&mut trie, &address)?;
    let (manifest, report) = trie
        .sync_under(manifest, &folder, files, remove)
        .context("Failed to sync manifest")?;
    let reference = trie.save(manifest).context("Failed to save manifest")?;

    let output = SyncOutput {
        success: true,
        result_code: 0,
        reference,
        new: report.new_count(),
        ok: report.ok_count(),
        removed: report.removed_count(),
        entries: report.entries,
    };
    writer.write(&output, || {
        let mut text = String::new();
        for entry in &output.entries {
            let _ = writeln!(text, "{} -> {}", entry.status, entry.path);
        }
        let _ = writeln!(text, "{}", reference);
        text
    })
}

fn cmd_merge(root: &Path, first: &str, second: &str, writer: &OutputWriter) -> Result<()> {
    let first = parse_address(first)?;
    let second = parse_address(second)?;

    let mut trie = open_trie(root)?;
    let a = load_root(&mut trie, &first)?;
    let b = load_root(&mut trie, &second)?;
    let merged = trie.merge(a, b).context("Failed to merge manifests")?;
    let reference = trie.save(merged).context("Failed to save manifest")?;

    let output = ManifestOutput {
        success: true,
        result_code: 0,
        reference,
        removed: None,
    };
    writer.write(&output, || format!("{}\n", reference))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListStyle {
    Plain,
    Bzz,
    Bytes,
}

fn cmd_list(root: &Path, address: &str, style: ListStyle, writer: &OutputWriter) -> Result<()> {
    let address = parse_address(address)?;
    let mut trie = open_trie(root)?;
    let manifest = load_root(&mut trie, &address)?;

    let entries = trie
        .resolve(manifest, &address.path)?
        .map(|entry| entry.map(entry_info))
        .collect::<mantle_core::Result<Vec<_>>>()
        .context("Failed to list manifest")?;

    let output = ListOutput {
        success: true,
        result_code: 0,
        root: address.reference,
        entries,
    };
    writer.write(&output, || {
        let mut text = String::new();
        for entry in &output.entries {
            let _ = match style {
                ListStyle::Plain => writeln!(text, "{} {}", entry.reference, entry.path),
                ListStyle::Bzz => writeln!(text, "/bzz/{}/{}", output.root, entry.path),
                ListStyle::Bytes => writeln!(text, "/bytes/{}", entry.reference),
            };
        }
        text
    })
}

fn cmd_download(root: &Path, address: &str, dest: &Path, writer: &OutputWriter) -> Result<()> {
    let address = parse_address(address)?;
    let mut trie = open_trie(root)?;
    let manifest = load_root(&mut trie, &address)?;

    let paths = trie
        .materialize(manifest, &address.path, dest)
        .with_context(|| format!("Failed to download to {}", dest.display()))?;

    let output = DownloadOutput {
        success: true,
        result_code: 0,
        destination: dest.display().to_string(),
        paths,
    };
    writer.write(&output, || {
        let mut text = String::new();
        for path in &output.paths {
            let _ = writeln!(text, "{}", path);
        }
        text
    })
}

fn cmd_index(
    root: &Path,
    address: &str,
    document: &str,
    error: Option<&str>,
    writer: &OutputWriter,
) -> Result<()> {
    let address = parse_address(address)?;
    let mut trie = open_trie(root)?;
    let manifest = load_root(&mut trie, &address)?;

    let mut metadata = trie.root_metadata(manifest).clone();
    metadata.insert(INDEX_DOCUMENT_KEY.to_string(), document.to_string());
    if let Some(error) = error {
        metadata.insert(ERROR_DOCUMENT_KEY.to_string(), error.to_string());
    }
    let manifest = trie.set_root_metadata(manifest, metadata);
    let reference = trie.save(manifest).context("Failed to save manifest")?;

    let output = ManifestOutput {
        success: true,
        result_code: 0,
        reference,
        removed: None,
    };
    writer.write(&output, || format!("{}\n", reference))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(path: &str) -> Address {
        Address::parse(&format!("{}/{}", "ab".repeat(32), path)).unwrap()
    }

    #[test]
    fn test_target_folder() {
        assert_eq!(target_folder(&address(""), None), "");
        assert_eq!(target_folder(&address("misc"), None), "misc/");
        assert_eq!(target_folder(&address("misc/"), Some("docs")), "misc/docs/");
        assert_eq!(target_folder(&address(""), Some("/docs/")), "docs/");
    }

    #[test]
    fn test_cli_parses_add_with_as() {
        let cli = Cli::try_parse_from([
            "mantle",
            "add",
            &format!("{}/misc", "ab".repeat(32)),
            "README.md",
            "--as",
            "docs/README.txt",
        ])
        .unwrap();
        match cli.command {
            Commands::Add { as_name, .. } => assert_eq!(as_name.as_deref(), Some("docs/README.txt")),
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_cli_list_styles_conflict() {
        let result = Cli::try_parse_from([
            "mantle",
            "list",
            "ab",
            "--print-bzz",
            "--print-bytes",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_verbosity_count() {
        let cli = Cli::try_parse_from(["mantle", "-vv", "--json", "create"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.json);
    }
}
