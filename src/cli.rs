use crate::errors::{AppError, Result};
use crate::federator::{DEFAULT_WORKERS, FailurePolicy, OnQueryError};
use crate::query::QueryColumns;
use clap::error::ErrorKind;
use clap::{ArgAction, Parser};

pub const DEFAULT_LEVEL: &str = "LEVEL";
pub const DEFAULT_STATS_LEVEL: &str = "STATS";

#[derive(Debug, Clone, Parser)]
#[command(
    name = "add_pep_position",
    about = "Include the peptide position within the protein in the report"
)]
struct PositionCli {
    #[arg(short = 'i', long = "input", help = "Report file")]
    input: Option<String>,
    #[arg(short = 'f', long = "fasta", help = "Protein sequences in FASTA format")]
    fasta: Option<String>,
    #[arg(long = "hp", help = "Column header of peptide level")]
    peptide_column: Option<String>,
    #[arg(long = "hq", help = "Column header of protein level")]
    protein_column: Option<String>,
    #[arg(short = 'o', long = "output", default_value = "-")]
    output: String,
    #[arg(long = "single-header", action = ArgAction::SetTrue)]
    single_header: bool,
    #[arg(long = "level", default_value = DEFAULT_LEVEL)]
    level: String,
    #[arg(long = "stats-level", default_value = DEFAULT_STATS_LEVEL)]
    stats_level: String,
    #[arg(
        short = 'T',
        long = "tabix",
        default_value = "tabix",
        help = "tabix executable; bgzip for .gz output is taken from the same directory"
    )]
    tabix: String,
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "get_annotations",
    about = "Retrieve indexed annotations for the given entities and positions"
)]
struct AnnotationCli {
    #[arg(short = 'i', long = "input", help = "Table that contains entity and positions")]
    input: Option<String>,
    #[arg(
        short = 'c',
        long = "columns",
        help = "Comma-separated columns: entity[,flank] or entity,start,end"
    )]
    columns: Option<String>,
    #[arg(short = 'd', long = "database", help = "Annotation table to index and query")]
    database: Option<String>,
    #[arg(short = 'o', long = "output", default_value = "-")]
    output: String,
    #[arg(short = 'w', long = "workers")]
    workers: Option<String>,
    #[arg(short = 'T', long = "tabix", default_value = "tabix")]
    tabix: String,
    #[arg(long = "on-error", default_value = "drop")]
    on_error: String,
    #[arg(long = "retries", default_value = "0")]
    retries: String,
    #[arg(long = "progress", action = ArgAction::SetTrue)]
    progress: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionArgs {
    pub input: String,
    pub fasta: String,
    pub peptide_column: String,
    pub protein_column: String,
    pub output: String,
    pub single_header: bool,
    pub level: String,
    pub stats_level: String,
    pub tabix: String,
}

impl Default for PositionArgs {
    fn default() -> Self {
        Self {
            input: String::new(),
            fasta: String::new(),
            peptide_column: String::new(),
            protein_column: String::new(),
            output: "-".to_string(),
            single_header: false,
            level: DEFAULT_LEVEL.to_string(),
            stats_level: DEFAULT_STATS_LEVEL.to_string(),
            tabix: "tabix".to_string(),
        }
    }
}

impl PositionArgs {
    pub fn header_rows(&self) -> usize {
        if self.single_header { 1 } else { 2 }
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("--input", &self.input),
            ("--fasta", &self.fasta),
            ("-hp", &self.peptide_column),
            ("-hq", &self.protein_column),
        ] {
            if value.is_empty() {
                return Err(AppError::MissingRequired {
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationQueryArgs {
    pub input: String,
    pub columns: QueryColumns,
    pub database: String,
    pub output: String,
    pub workers: usize,
    pub tabix: String,
    pub policy: FailurePolicy,
    pub progress: bool,
}

impl Default for AnnotationQueryArgs {
    fn default() -> Self {
        Self {
            input: String::new(),
            columns: QueryColumns::Entity {
                entity: String::new(),
            },
            database: String::new(),
            output: "-".to_string(),
            workers: DEFAULT_WORKERS,
            tabix: "tabix".to_string(),
            policy: FailurePolicy::default(),
            progress: false,
        }
    }
}

impl AnnotationQueryArgs {
    pub fn validate(&self) -> Result<()> {
        if self.input.is_empty() {
            return Err(AppError::MissingRequired {
                field: "--input".to_string(),
            });
        }
        if self.database.is_empty() {
            return Err(AppError::MissingRequired {
                field: "--database".to_string(),
            });
        }
        if self.workers == 0 {
            return Err(AppError::InvalidValue {
                flag: "--workers".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

pub fn parse_position_from_env() -> Result<PositionArgs> {
    parse_position_args(std::env::args())
}

pub fn parse_position_args<I, S>(args: I) -> Result<PositionArgs>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let tokens = collect_tokens(args, "add_pep_position");
    let cli = PositionCli::try_parse_from(normalize_legacy_tokens(tokens)).map_err(map_clap_error)?;

    let parsed = PositionArgs {
        input: cli.input.unwrap_or_default(),
        fasta: cli.fasta.unwrap_or_default(),
        peptide_column: cli.peptide_column.unwrap_or_default(),
        protein_column: cli.protein_column.unwrap_or_default(),
        output: cli.output,
        single_header: cli.single_header,
        level: cli.level,
        stats_level: cli.stats_level,
        tabix: cli.tabix,
    };

    parsed.validate()?;
    Ok(parsed)
}

pub fn parse_annotation_from_env() -> Result<AnnotationQueryArgs> {
    parse_annotation_args(std::env::args())
}

pub fn parse_annotation_args<I, S>(args: I) -> Result<AnnotationQueryArgs>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let tokens = collect_tokens(args, "get_annotations");
    let cli =
        AnnotationCli::try_parse_from(normalize_legacy_tokens(tokens)).map_err(map_clap_error)?;

    let columns = cli.columns.ok_or_else(|| AppError::MissingRequired {
        field: "--columns".to_string(),
    })?;
    let on_error = OnQueryError::parse(&cli.on_error).ok_or_else(|| AppError::InvalidValue {
        flag: "--on-error".to_string(),
        value: cli.on_error.clone(),
        reason: "supported policies are \"drop\"(default) and \"fail-fast\"".to_string(),
    })?;

    let parsed = AnnotationQueryArgs {
        input: cli.input.unwrap_or_default(),
        columns: QueryColumns::parse(&columns)?,
        database: cli.database.unwrap_or_default(),
        output: cli.output,
        workers: match cli.workers {
            Some(value) => parse_usize("--workers", &value)?,
            None => DEFAULT_WORKERS,
        },
        tabix: cli.tabix,
        policy: FailurePolicy {
            retries: parse_usize("--retries", &cli.retries)?,
            on_error,
        },
        progress: cli.progress,
    };

    parsed.validate()?;
    Ok(parsed)
}

fn collect_tokens<I, S>(args: I, program: &str) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut tokens: Vec<String> = args.into_iter().map(Into::into).collect();
    if tokens.is_empty() {
        tokens.push(program.to_string());
    }
    tokens
}

fn normalize_legacy_tokens(tokens: Vec<String>) -> Vec<String> {
    tokens
        .into_iter()
        .map(|token| {
            if token == "-hp" {
                "--hp".to_string()
            } else if token == "-hq" {
                "--hq".to_string()
            } else if let Some(value) = token.strip_prefix("-hp=") {
                format!("--hp={value}")
            } else if let Some(value) = token.strip_prefix("-hq=") {
                format!("--hq={value}")
            } else {
                token
            }
        })
        .collect()
}

fn map_clap_error(error: clap::Error) -> AppError {
    let rendered = error.to_string();
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => AppError::HelpRequested {
            text: error.render().to_string(),
        },
        ErrorKind::UnknownArgument => AppError::UnsupportedArgument {
            arg: first_quoted_token(&rendered).unwrap_or(rendered),
        },
        ErrorKind::TooFewValues | ErrorKind::WrongNumberOfValues | ErrorKind::InvalidValue
            if rendered.contains("a value is required") =>
        {
            AppError::MissingValue {
                flag: first_quoted_token(&rendered).unwrap_or_else(|| "argument".to_string()),
            }
        }
        ErrorKind::TooFewValues | ErrorKind::WrongNumberOfValues => AppError::MissingValue {
            flag: first_quoted_token(&rendered).unwrap_or_else(|| "argument".to_string()),
        },
        _ => AppError::ParseError {
            message: clap_error_message(&rendered),
        },
    }
}

fn first_quoted_token(message: &str) -> Option<String> {
    let start = message.find('\'')?;
    let end = message[start + 1..].find('\'')?;
    Some(message[start + 1..start + 1 + end].to_string())
}

fn clap_error_message(message: &str) -> String {
    message
        .lines()
        .find_map(|line| line.strip_prefix("error: "))
        .or_else(|| message.lines().next())
        .unwrap_or("failed to parse arguments")
        .to_string()
}

fn parse_usize(flag: &str, value: &str) -> Result<usize> {
    value.parse::<usize>().map_err(|_| AppError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
        reason: "must be a non-negative integer".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::{parse_annotation_args, parse_position_args};
    use crate::errors::AppError;
    use crate::federator::OnQueryError;
    use crate::query::QueryColumns;

    #[test]
    fn parses_legacy_position_flags() {
        let args = parse_position_args([
            "add_pep_position",
            "-i",
            "Npep2prot.tsv",
            "-f",
            "human.fasta",
            "-hp",
            "peptide",
            "-hq",
            "protein",
            "-o",
            "out.tsv",
        ])
        .expect("expected parse success");

        assert_eq!(args.peptide_column, "peptide");
        assert_eq!(args.protein_column, "protein");
        assert_eq!(args.header_rows(), 2);
        assert_eq!(args.level, "LEVEL");
        assert_eq!(args.stats_level, "STATS");
    }

    #[test]
    fn parses_single_header_mode() {
        let args = parse_position_args([
            "add_pep_position",
            "-i",
            "in.tsv",
            "-f",
            "db.fa",
            "-hp=peptide",
            "-hq=protein",
            "--single-header",
        ])
        .expect("expected parse success");
        assert_eq!(args.header_rows(), 1);
        assert_eq!(args.output, "-");
        assert_eq!(args.tabix, "tabix");
    }

    #[test]
    fn position_output_tools_follow_tabix_flag() {
        let args = parse_position_args([
            "add_pep_position",
            "-i",
            "in.tsv",
            "-f",
            "db.fa",
            "-hp",
            "peptide",
            "-hq",
            "protein",
            "-o",
            "out.tsv.gz",
            "-T",
            "/opt/htslib/bin/tabix",
        ])
        .expect("expected parse success");
        assert_eq!(
            crate::external_tools::ExternalTools::new(args.tabix).bgzip(),
            "/opt/htslib/bin/bgzip"
        );
    }

    #[test]
    fn rejects_missing_protein_column() {
        let result = parse_position_args(["add_pep_position", "-i", "in.tsv", "-f", "db.fa", "-hp", "p"]);
        assert!(matches!(result, Err(AppError::MissingRequired { .. })));
    }

    #[test]
    fn parses_annotation_query_args() {
        let args = parse_annotation_args([
            "get_annotations",
            "-w",
            "10",
            "-i",
            "table.txt",
            "-c",
            "q, b ,e",
            "-d",
            "human.appris.tsv",
            "-o",
            "annots.tsv",
        ])
        .expect("expected parse success");

        assert_eq!(args.workers, 10);
        assert_eq!(args.tabix, "tabix");
        assert_eq!(args.policy.retries, 0);
        assert_eq!(args.policy.on_error, OnQueryError::Drop);
        assert!(matches!(args.columns, QueryColumns::Range { .. }));
    }

    #[test]
    fn annotation_defaults_to_four_workers() {
        let args = parse_annotation_args(["get_annotations", "-i", "t", "-c", "q", "-d", "db"])
            .expect("expected parse success");
        assert_eq!(args.workers, 4);
    }

    #[test]
    fn parses_failure_policy() {
        let args = parse_annotation_args([
            "get_annotations",
            "-i",
            "t",
            "-c",
            "q,f",
            "-d",
            "db",
            "--on-error",
            "fail-fast",
            "--retries",
            "2",
        ])
        .expect("expected parse success");
        assert_eq!(args.policy.on_error, OnQueryError::FailFast);
        assert_eq!(args.policy.retries, 2);
    }

    #[test]
    fn rejects_zero_workers_and_unknown_policy() {
        let zero = parse_annotation_args(["get_annotations", "-i", "t", "-c", "q", "-d", "db", "-w", "0"]);
        assert!(matches!(zero, Err(AppError::InvalidValue { .. })));

        let unknown = parse_annotation_args([
            "get_annotations",
            "-i",
            "t",
            "-c",
            "q",
            "-d",
            "db",
            "--on-error",
            "retry-forever",
        ]);
        assert!(matches!(unknown, Err(AppError::InvalidValue { .. })));
    }

    #[test]
    fn help_is_returned_instead_of_exiting() {
        let result = parse_position_args(["add_pep_position", "--help"]);
        match result {
            Err(AppError::HelpRequested { text }) => assert!(text.contains("--fasta")),
            other => panic!("expected help text, got {other:?}"),
        }
        let result = parse_annotation_args(["get_annotations", "-h"]);
        assert!(matches!(result, Err(AppError::HelpRequested { .. })));
    }

    #[test]
    fn rejects_unknown_argument() {
        let result = parse_annotation_args(["get_annotations", "--bogus"]);
        assert!(matches!(result, Err(AppError::UnsupportedArgument { .. })));
    }
}
