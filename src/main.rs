use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rulebook_qa::Result;
use rulebook_qa::commands::{
    add_document, ask, check_consistency, delete_document, explain, index_document,
    search_passages, show_status,
};
use rulebook_qa::config::{run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "rulebook-qa")]
#[command(about = "Index board game rulebooks and answer rules questions from them")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding provider and chunking settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Add a rulebook document from a pre-extracted text file and index it
    Add {
        /// Game this rulebook belongs to
        game_id: i64,
        /// Display title for the document
        title: String,
        /// Path to the extracted plain-text rulebook
        #[arg(long)]
        text_file: PathBuf,
        /// Optional JSON page offset map produced by the extractor
        #[arg(long)]
        pages_file: Option<PathBuf>,
    },
    /// Index or re-index a document
    Index {
        /// Document ID to index
        document_id: i64,
    },
    /// Ask a rules question against a game's indexed rulebooks
    Ask {
        /// Game to search
        game_id: i64,
        /// The question
        query: String,
    },
    /// Show raw similarity search results for a query
    Search {
        /// Game to search
        game_id: i64,
        /// The query
        query: String,
        /// Maximum number of passages to return
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Stitch the most relevant passages into a source-labelled explanation
    Explain {
        /// Game to search
        game_id: i64,
        /// The topic to explain
        query: String,
    },
    /// Show indexing status for one document or all documents
    Status {
        /// Document ID to inspect
        document_id: Option<i64>,
    },
    /// Cross-check the metadata store against the vector store
    Check {
        /// Re-index documents that are stuck or drifted
        #[arg(long)]
        repair: bool,
    },
    /// Delete a document along with its index record and vectors
    Delete {
        /// Document ID to delete
        document_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config().await?;
            }
        }
        Commands::Add {
            game_id,
            title,
            text_file,
            pages_file,
        } => {
            add_document(game_id, title, &text_file, pages_file.as_deref()).await?;
        }
        Commands::Index { document_id } => {
            index_document(document_id).await?;
        }
        Commands::Ask { game_id, query } => {
            ask(game_id, &query).await?;
        }
        Commands::Search {
            game_id,
            query,
            limit,
        } => {
            search_passages(game_id, &query, limit).await?;
        }
        Commands::Explain { game_id, query } => {
            explain(game_id, &query).await?;
        }
        Commands::Status { document_id } => {
            show_status(document_id).await?;
        }
        Commands::Check { repair } => {
            check_consistency(repair).await?;
        }
        Commands::Delete { document_id } => {
            delete_document(document_id).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["rulebook-qa", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::Status { .. });
        }
    }

    #[test]
    fn add_command_requires_text_file() {
        let cli = Cli::try_parse_from(["rulebook-qa", "add", "3", "Core Rules"]);
        assert!(cli.is_err());

        let cli = Cli::try_parse_from([
            "rulebook-qa",
            "add",
            "3",
            "Core Rules",
            "--text-file",
            "rules.txt",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Add {
                game_id,
                title,
                text_file,
                pages_file,
            } = parsed.command
            {
                assert_eq!(game_id, 3);
                assert_eq!(title, "Core Rules");
                assert_eq!(text_file, PathBuf::from("rules.txt"));
                assert_eq!(pages_file, None);
            }
        }
    }

    #[test]
    fn ask_command_with_query() {
        let cli = Cli::try_parse_from(["rulebook-qa", "ask", "3", "how do you win?"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ask { game_id, query } = parsed.command {
                assert_eq!(game_id, 3);
                assert_eq!(query, "how do you win?");
            }
        }
    }

    #[test]
    fn search_command_default_limit() {
        let cli = Cli::try_parse_from(["rulebook-qa", "search", "3", "setup"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search { limit, .. } = parsed.command {
                assert_eq!(limit, 5);
            }
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["rulebook-qa", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["rulebook-qa", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["rulebook-qa", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
