//! files command - List, upload and download session files

use std::path::PathBuf;

use clap::{Args, Subcommand};
use serde::Serialize;

use super::{ConnectOpts, connect_session, report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Transfer files to and from the session
#[derive(Args, Debug)]
pub struct FilesArgs {
    #[command(subcommand)]
    pub command: FilesCommands,
}

#[derive(Subcommand, Debug)]
pub enum FilesCommands {
    /// List the session's files
    List(ListArgs),

    /// Upload a local file
    Upload(UploadArgs),

    /// Download one file
    Download(DownloadArgs),

    /// Download every file
    DownloadAll(DownloadAllArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Show file URLs
    #[arg(short, long)]
    pub long: bool,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Local file
    pub src: PathBuf,

    /// Name on the server; defaults to the local file name
    #[arg(long)]
    pub name: Option<String>,

    /// Create with POST instead of overwriting with PUT
    #[arg(long)]
    pub post: bool,
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// File name on the server
    pub name: String,

    /// Where to save it; defaults to the file name in the current directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DownloadAllArgs {
    /// Destination directory
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct SavedFile {
    path: String,
    size_bytes: u64,
    size_human: String,
}

impl SavedFile {
    fn new(path: PathBuf, bytes: u64) -> Self {
        Self {
            path: path.display().to_string(),
            size_bytes: bytes,
            size_human: humansize::format_size(bytes, humansize::BINARY),
        }
    }
}

/// Execute the files command
pub async fn execute(args: FilesArgs, opts: &ConnectOpts, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let stc = match connect_session(opts, &formatter).await {
        Ok(stc) => stc,
        Err(code) => return code,
    };

    match args.command {
        FilesCommands::List(a) => {
            let listed = if a.long { stc.file_urls().await } else { stc.files().await };
            match listed {
                Ok(names) => {
                    if formatter.is_json() {
                        formatter.json(&names);
                    } else {
                        for n in &names {
                            formatter.println(n);
                        }
                    }
                    ExitCode::Success
                }
                Err(e) => report(&formatter, &e),
            }
        }
        FilesCommands::Upload(a) => {
            let uploaded = if a.post {
                stc.upload_file(&a.src, a.name.as_deref(), false).await
            } else {
                stc.upload(&a.src, a.name.as_deref()).await
            };
            match uploaded {
                Ok(reply) => {
                    if formatter.is_json() {
                        formatter.json(&reply);
                    } else {
                        formatter.success(&format!("Uploaded {}", a.src.display()));
                    }
                    ExitCode::Success
                }
                Err(e) => report(&formatter, &e),
            }
        }
        FilesCommands::Download(a) => match stc.download(&a.name, a.output.as_deref()).await {
            Ok((path, bytes)) => {
                print_saved(&formatter, vec![SavedFile::new(path, bytes)]);
                ExitCode::Success
            }
            Err(e) => report(&formatter, &e),
        },
        FilesCommands::DownloadAll(a) => match stc.download_all(a.dir.as_deref()).await {
            Ok(saved) => {
                print_saved(
                    &formatter,
                    saved.into_iter().map(|(p, b)| SavedFile::new(p, b)).collect(),
                );
                ExitCode::Success
            }
            Err(e) => report(&formatter, &e),
        },
    }
}

fn print_saved(formatter: &Formatter, saved: Vec<SavedFile>) {
    if formatter.is_json() {
        formatter.json(&saved);
        return;
    }
    let total: u64 = saved.iter().map(|s| s.size_bytes).sum();
    let count = saved.len();
    formatter.table(
        &["File", "Size"],
        saved.into_iter().map(|s| vec![s.path, s.size_human]),
    );
    formatter.success(&format!("Saved {count} file(s), {}", formatter.style_size(total)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saved_file_sizes() {
        let saved = SavedFile::new(PathBuf::from("out/a.log"), 2048);
        assert_eq!(saved.size_bytes, 2048);
        assert_eq!(saved.size_human, "2 KiB");
        assert!(saved.path.ends_with("a.log"));
    }
}
