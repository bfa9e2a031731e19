use anyhow::Result;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use gitcore::areas::repository::Repository;
use gitcore::artifacts::objects::object_type::ObjectType;
use gitcore::commands::plumbing::cat_file::CatFileMode;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "gitcore",
    version = "0.1.0",
    author = "Sami Barbut-Dica",
    about = "A Git-compatible object store",
    long_about = "Plumbing over a Git repository: loose objects and packfiles, \
    references, history walking, the index and pkt-line fetch streams.",
    help_template = r"
{name} {version} - {about}

USAGE:
    {usage}

OPTIONS:
    {all-args}
",
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(
        name = "init",
        about = "Initialize a new repository",
        long_about = "This command initializes a new repository in the current directory or at the specified path."
    )]
    Init {
        #[arg(index = 1, help = "The path to the repository")]
        path: Option<String>,
    },
    #[command(
        name = "hash-object",
        about = "Hash an object and optionally write it to the object database"
    )]
    HashObject {
        #[arg(short, long, help = "Write the object to the object database")]
        write: bool,
        #[arg(short = 't', long = "type", default_value = "blob", help = "The object type")]
        object_type: String,
        #[arg(index = 1)]
        file: String,
    },
    #[command(name = "cat-file", about = "Print the content, type or size of an object")]
    CatFile {
        #[arg(short = 'p', help = "Pretty-print the object", group = "mode")]
        pretty: bool,
        #[arg(short = 't', help = "Print the object type", group = "mode")]
        show_type: bool,
        #[arg(short = 's', help = "Print the object size", group = "mode")]
        size: bool,
        #[arg(index = 1, help = "The object, as any revision expression")]
        object: String,
    },
    #[command(
        name = "rev-list",
        about = "List commits reachable from some revisions but not others"
    )]
    RevList {
        #[arg(long, help = "Also list the trees and blobs the commits introduce")]
        objects: bool,
        #[arg(help = "<rev>, ^<rev> or <a>..<b>")]
        revisions: Vec<String>,
    },
    #[command(name = "show-ref", about = "List references with the objects they point to")]
    ShowRef {
        #[arg(long, help = "Only branches")]
        heads: bool,
        #[arg(long, help = "Only tags")]
        tags: bool,
        #[arg(short, long, help = "Also show what annotated tags point to")]
        dereference: bool,
    },
    #[command(name = "check-ref-format", about = "Exit with status 1 if a reference name is invalid")]
    CheckRefFormat {
        #[arg(index = 1)]
        name: String,
    },
    #[command(name = "update-ref", about = "Update or delete a reference safely")]
    UpdateRef {
        #[arg(short, help = "Delete the reference")]
        delete: bool,
        #[arg(index = 1)]
        name: String,
        #[arg(index = 2, help = "The new value, or the expected old value with -d")]
        new_value: Option<String>,
        #[arg(index = 3, help = "The expected old value")]
        old_value: Option<String>,
    },
    #[command(name = "symbolic-ref", about = "Read or set a symbolic reference")]
    SymbolicRef {
        #[arg(index = 1)]
        name: String,
        #[arg(index = 2)]
        target: Option<String>,
    },
    #[command(name = "pack-refs", about = "Move loose references into packed-refs")]
    PackRefs,
    #[command(name = "add", about = "Add file contents to the index")]
    Add {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    #[command(name = "status", about = "Show deleted and modified tracked files")]
    Status,
    #[command(name = "index-pack", about = "Build the index for a pack file")]
    IndexPack {
        #[arg(index = 1)]
        pack: PathBuf,
    },
    #[command(name = "verify-pack", about = "Validate a pack against its index")]
    VerifyPack {
        #[arg(short, long, help = "List every entry")]
        verbose: bool,
        #[arg(index = 1, help = "The .idx or .pack file")]
        pack: PathBuf,
    },
    #[command(name = "unpack-objects", about = "Unpack a pack read from standard input")]
    UnpackObjects,
    #[command(name = "pack-objects", about = "Write a pack of the objects a range introduces")]
    PackObjects {
        #[arg(index = 1, help = "Written as <base-name>-<checksum>.pack and .idx")]
        base_name: String,
        #[arg(index = 2, help = "<rev>, ^<rev> or <a>..<b>")]
        revisions: Vec<String>,
    },
    #[command(
        name = "fetch-pack",
        about = "Receive an upload-pack response stream and record its references",
        long_about = "This command reads a reference advertisement followed by a side-band \
        pack from standard input or a file, stores the pack and writes the \
        remote-tracking references."
    )]
    FetchPack {
        #[arg(long, default_value = "origin", help = "The remote name")]
        remote: String,
        #[arg(long, help = "Read the stream from this file instead of standard input")]
        input: Option<PathBuf>,
    },
}

fn open_repository() -> Result<Repository> {
    let pwd = std::env::current_dir()?;
    Repository::new(&pwd.to_string_lossy(), Box::new(std::io::stdout()))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Init { path } => {
            let repository = match path {
                Some(path) => Repository::new(path, Box::new(std::io::stdout()))?,
                None => open_repository()?,
            };

            repository.init()?
        }
        Commands::HashObject {
            write,
            object_type,
            file,
        } => {
            let object_type = ObjectType::try_from(object_type.as_str())?;
            open_repository()?.hash_object(file, object_type, *write)?;
        }
        Commands::CatFile {
            show_type,
            size,
            object,
            ..
        } => {
            let mode = if *show_type {
                CatFileMode::Type
            } else if *size {
                CatFileMode::Size
            } else {
                CatFileMode::Pretty
            };

            open_repository()?.cat_file(object, mode)?
        }
        Commands::RevList { objects, revisions } => {
            open_repository()?.rev_list(revisions, *objects)?
        }
        Commands::ShowRef {
            heads,
            tags,
            dereference,
        } => {
            if open_repository()?.show_ref(*heads, *tags, *dereference)? == 0 {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::CheckRefFormat { name } => {
            if !open_repository()?.check_ref_format(name) {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::UpdateRef {
            delete,
            name,
            new_value,
            old_value,
        } => {
            let repository = open_repository()?;
            if *delete {
                repository.delete_ref(name, new_value.as_deref())?
            } else {
                let new_value = new_value
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("update-ref needs a new value"))?;
                repository.update_ref(name, new_value, old_value.as_deref())?
            }
        }
        Commands::SymbolicRef { name, target } => {
            open_repository()?.symbolic_ref(name, target.as_deref())?
        }
        Commands::PackRefs => {
            open_repository()?.pack_refs()?;
        }
        Commands::Add { paths } => {
            open_repository()?.add(paths).await?;
        }
        Commands::Status => open_repository()?.status().await?,
        Commands::IndexPack { pack } => {
            open_repository()?.index_pack(pack)?;
        }
        Commands::VerifyPack { verbose, pack } => {
            open_repository()?.verify_pack(pack, *verbose)?
        }
        Commands::UnpackObjects => {
            let mut data = Vec::new();
            tokio::io::stdin().read_to_end(&mut data).await?;

            open_repository()?.unpack_objects(Bytes::from(data))?;
        }
        Commands::PackObjects {
            base_name,
            revisions,
        } => {
            open_repository()?.write_pack_objects(base_name, revisions)?;
        }
        Commands::FetchPack { remote, input } => {
            let repository = open_repository()?;
            let written = match input {
                Some(input) => {
                    let file = tokio::fs::File::open(Path::new(input)).await?;
                    repository.fetch(file, remote).await?
                }
                None => repository.fetch(tokio::io::stdin(), remote).await?,
            };

            for name in written {
                println!("{name}");
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
