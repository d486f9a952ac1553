//! Command-line front end: pick data and an algorithm, train on the cluster, print the model id.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mltrain::algorithms::{AlgorithmId, ParamDefault, catalog};
use mltrain::cluster::{ClusterClient, QueryApi};
use mltrain::config::{self, AppConfig};
use mltrain::data_source::DataSourceMode;
use mltrain::logging;
use mltrain::tabular::{Cell, TabularTable};
use mltrain::training::{Lifecycle, TrainingSession};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = logging::init(options.verbose) {
        eprintln!("Logging disabled: {err}");
    }

    if options.list_algorithms {
        print_algorithms();
        return Ok(());
    }

    let config = load_config(&options)?;
    let client = Arc::new(ClusterClient::from_config(&config).map_err(|err| err.to_string())?);
    tracing::debug!("Using cluster {}", client.endpoint());

    if options.list_indices {
        for index in client.index_patterns().map_err(|err| err.to_string())? {
            println!("{index}");
        }
        return Ok(());
    }
    if let Some(index) = &options.list_fields {
        for field in client.fields(index).map_err(|err| err.to_string())? {
            println!("{}\t{}", field.name, field.field_type);
        }
        return Ok(());
    }

    let mut session = TrainingSession::new(&config, client.clone()).with_query_api(client);
    if let Some(algorithm) = options.algorithm {
        session.select_algorithm(algorithm);
    }
    for (name, value) in &options.params {
        session
            .set_param(name, value)
            .map_err(|err| err.to_string())?;
    }

    match &options.source {
        Source::File { path, columns } => {
            session.choose_file(path.clone());
            settle(&mut session, options.timeout, "decoding the file")?;
            if let Some(err) = session.upload().decode_error() {
                return Err(err.to_string());
            }
            let selection = resolve_columns(session.upload().table(), columns)?;
            session
                .select_columns(selection)
                .map_err(|err| err.to_string())?;
        }
        Source::Index {
            index,
            fields,
            query,
        } => {
            session.set_mode(DataSourceMode::Query);
            session.set_query_fields(index.clone(), fields.clone());
            session.set_query(Some(query.clone()));
            if options.preview {
                session
                    .begin_query_preview()
                    .map_err(|err| err.to_string())?;
                settle(&mut session, options.timeout, "the query preview")?;
                if let Some(err) = session.preview_error() {
                    return Err(err.to_string());
                }
                if let Some(table) = session.preview() {
                    print_table(table);
                }
                return Ok(());
            }
        }
    }

    session.submit();
    settle(&mut session, options.timeout, "training")?;
    match session.lifecycle() {
        Lifecycle::Succeeded { model_id } => {
            println!("{model_id}");
            Ok(())
        }
        Lifecycle::Failed { message } => Err(message.clone()),
        Lifecycle::Pending { task_id: None } => {
            println!("Training accepted; the cluster returned no task id to follow");
            Ok(())
        }
        other => Err(format!("Training did not finish: {other:?}")),
    }
}

fn settle(session: &mut TrainingSession, timeout: Duration, what: &str) -> Result<(), String> {
    if session.wait_until_settled(timeout) {
        Ok(())
    } else {
        Err(format!("Timed out after {}s waiting for {what}", timeout.as_secs()))
    }
}

fn load_config(options: &CliOptions) -> Result<AppConfig, String> {
    let config = match &options.config_path {
        Some(path) => config::load_from_path(path),
        None => config::load_or_default(),
    }
    .map_err(|err| err.to_string())?;
    let mut config = config;
    if let Some(endpoint) = &options.endpoint {
        config.cluster.endpoint = endpoint.clone();
    }
    if options.run_async {
        config.training.async_training = true;
    }
    Ok(config.normalized())
}

/// Map `--columns` entries (indices or header names) onto table indices.
/// No entries selects every column.
fn resolve_columns(table: &TabularTable, columns: &[String]) -> Result<Vec<usize>, String> {
    if columns.is_empty() {
        return Ok((0..table.column_count()).collect());
    }
    columns
        .iter()
        .map(|column| {
            if let Ok(index) = column.parse::<usize>() {
                return Ok(index);
            }
            table
                .columns
                .iter()
                .position(|name| name == column)
                .ok_or_else(|| format!("No column named '{column}'"))
        })
        .collect()
}

fn print_algorithms() {
    for spec in catalog() {
        println!("{} ({})", spec.id, spec.label);
        for param in spec.parameters {
            let default = match param.default {
                ParamDefault::Integer(value) => value.to_string(),
                ParamDefault::Float(value) => value.to_string(),
                ParamDefault::Text(value) => format!("\"{value}\""),
            };
            match param.choices {
                Some(choices) => {
                    println!("  {} = {default} [{}]", param.name, choices.join(", "))
                }
                None => println!("  {} = {default}", param.name),
            }
        }
    }
}

fn print_table(table: &TabularTable) {
    println!("{}", table.columns.join("\t"));
    for row in &table.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| match cell {
                Cell::Empty => String::new(),
                Cell::Bool(value) => value.to_string(),
                Cell::Number(value) => value.to_string(),
                Cell::Text(text) => text.clone(),
            })
            .collect();
        println!("{}", cells.join("\t"));
    }
}

#[derive(Debug, Clone)]
enum Source {
    File {
        path: PathBuf,
        columns: Vec<String>,
    },
    Index {
        index: String,
        fields: Vec<String>,
        query: serde_json::Value,
    },
}

#[derive(Debug, Clone)]
struct CliOptions {
    source: Source,
    algorithm: Option<AlgorithmId>,
    params: Vec<(String, String)>,
    config_path: Option<PathBuf>,
    endpoint: Option<String>,
    run_async: bool,
    timeout: Duration,
    preview: bool,
    verbose: bool,
    list_algorithms: bool,
    list_indices: bool,
    list_fields: Option<String>,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut file: Option<PathBuf> = None;
    let mut columns: Vec<String> = Vec::new();
    let mut index: Option<String> = None;
    let mut fields: Vec<String> = Vec::new();
    let mut query: Option<serde_json::Value> = None;
    let mut algorithm: Option<AlgorithmId> = None;
    let mut params = Vec::new();
    let mut config_path: Option<PathBuf> = None;
    let mut endpoint: Option<String> = None;
    let mut run_async = false;
    let mut timeout_secs = 600u64;
    let mut preview = false;
    let mut verbose = false;
    let mut list_algorithms = false;
    let mut list_indices = false;
    let mut list_fields: Option<String> = None;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--file" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--file requires a value".to_string())?;
                file = Some(PathBuf::from(value));
            }
            "--columns" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--columns requires a value".to_string())?;
                columns = split_list(value);
            }
            "--index" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--index requires a value".to_string())?;
                index = Some(value.clone());
            }
            "--fields" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--fields requires a value".to_string())?;
                fields = split_list(value);
            }
            "--query" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--query requires a value".to_string())?;
                query = Some(
                    serde_json::from_str(value)
                        .map_err(|err| format!("Invalid --query JSON: {err}"))?,
                );
            }
            "--algorithm" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--algorithm requires a value".to_string())?;
                algorithm = Some(value.parse().map_err(|err| format!("{err}"))?);
            }
            "--param" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--param requires a value".to_string())?;
                let (name, raw) = value
                    .split_once('=')
                    .ok_or_else(|| format!("Invalid --param value (expected name=value): {value}"))?;
                params.push((name.trim().to_string(), raw.to_string()));
            }
            "--config" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--config requires a value".to_string())?;
                config_path = Some(PathBuf::from(value));
            }
            "--endpoint" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--endpoint requires a value".to_string())?;
                endpoint = Some(value.clone());
            }
            "--timeout" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--timeout requires a value".to_string())?;
                timeout_secs = value
                    .parse::<u64>()
                    .map_err(|_| format!("Invalid --timeout value: {value}"))?;
            }
            "--list-fields" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--list-fields requires a value".to_string())?;
                list_fields = Some(value.clone());
            }
            "--async" => run_async = true,
            "--preview" => preview = true,
            "-v" | "--verbose" => verbose = true,
            "--list-algorithms" => list_algorithms = true,
            "--list-indices" => list_indices = true,
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }

    let listing = list_algorithms || list_indices || list_fields.is_some();
    let source = match (file, index) {
        (Some(_), Some(_)) => return Err("Use either --file or --index, not both".to_string()),
        (Some(path), None) => Source::File { path, columns },
        (None, Some(index)) => {
            if fields.is_empty() && !listing {
                return Err("--index requires --fields".to_string());
            }
            Source::Index {
                index,
                fields,
                query: query.unwrap_or_else(|| serde_json::json!({"match_all": {}})),
            }
        }
        (None, None) if listing => Source::File {
            path: PathBuf::new(),
            columns,
        },
        (None, None) => return Err(format!("Either --file or --index is required\n\n{}", help_text())),
    };
    if preview && !matches!(source, Source::Index { .. }) {
        return Err("--preview requires --index".to_string());
    }

    Ok(CliOptions {
        source,
        algorithm,
        params,
        config_path,
        endpoint,
        run_async,
        timeout: Duration::from_secs(timeout_secs.max(1)),
        preview,
        verbose,
        list_algorithms,
        list_indices,
        list_fields,
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn help_text() -> String {
    [
        "mltrain",
        "",
        "Trains a model on the search cluster from a local file or an index query.",
        "",
        "Usage:",
        "  mltrain --file <path> [--columns 0,2|name,...] [options]",
        "  mltrain --index <name> --fields a,b [--query <json>] [--preview] [options]",
        "  mltrain --list-algorithms | --list-indices | --list-fields <index>",
        "",
        "Options:",
        "  --file <path>          CSV or JSON file to upload.",
        "  --columns <list>       Columns to train on, by index or header name (default: all).",
        "  --index <name>         Index pattern to query.",
        "  --fields <list>        Fields to train on (required with --index).",
        "  --query <json>         Query body (default: match_all).",
        "  --preview              Print a sample of the query's hits instead of training.",
        "  --algorithm <id>       kmeans, linear_regression or batch_rcf (default from config).",
        "  --param <name=value>   Override one hyperparameter; repeatable.",
        "  --async                Train asynchronously and poll the task.",
        "  --timeout <secs>       Give up waiting after this many seconds (default: 600).",
        "  --config <file>        Config file (default: <config dir>/.mltrain/config.toml).",
        "  --endpoint <url>       Override the cluster endpoint.",
        "  -v, --verbose          Debug logging.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn parses_file_training_options() {
        let options = parse_args(args(&[
            "--file",
            "iris.csv",
            "--columns",
            "0, 2",
            "--algorithm",
            "KMEANS",
            "--param",
            "centroids=3",
        ]))
        .unwrap();
        assert!(matches!(
            &options.source,
            Source::File { path, columns } if path == &PathBuf::from("iris.csv") && columns == &["0", "2"]
        ));
        assert_eq!(options.algorithm, Some(AlgorithmId::Kmeans));
        assert_eq!(options.params, vec![("centroids".to_string(), "3".to_string())]);
    }

    #[test]
    fn index_mode_defaults_to_match_all() {
        let options = parse_args(args(&["--index", "iris", "--fields", "a,b"])).unwrap();
        match options.source {
            Source::Index { query, fields, .. } => {
                assert_eq!(query, serde_json::json!({"match_all": {}}));
                assert_eq!(fields, vec!["a", "b"]);
            }
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_or_missing_sources() {
        assert!(parse_args(args(&["--file", "a.csv", "--index", "iris"])).is_err());
        assert!(parse_args(args(&["--algorithm", "kmeans"])).is_err());
        assert!(parse_args(args(&["--index", "iris"])).is_err());
        assert!(parse_args(args(&["--param", "novalue"])).is_err());
        assert!(parse_args(args(&["--list-algorithms"])).is_ok());
    }

    #[test]
    fn resolves_columns_by_index_or_name() {
        let table = TabularTable {
            columns: vec!["x".into(), "y".into()],
            rows: vec![vec![Cell::Number(1.0), Cell::Number(2.0)]],
        };
        assert_eq!(resolve_columns(&table, &[]).unwrap(), vec![0, 1]);
        assert_eq!(
            resolve_columns(&table, &["y".into(), "0".into()]).unwrap(),
            vec![1, 0]
        );
        assert!(resolve_columns(&table, &["z".into()]).is_err());
    }
}
