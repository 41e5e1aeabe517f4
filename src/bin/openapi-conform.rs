//! OpenAPI Conformance CLI
//!
//! Command-line interface for resolving requests and validating messages
//! against an OpenAPI document.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use openapi_conform::{
    load_spec_auto, normalize_mimetype, PathFinder, Request, RequestValidator, Response,
    ResponseValidator, Spec, ValidationError, ValidatorOptions,
};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "openapi-conform")]
#[command(about = "Resolve and validate HTTP messages against an OpenAPI document")]
#[command(version)]
struct Cli {
    /// Log resolution and validation steps to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a request to its path, operation and server
    Find {
        /// Spec source: file path or URL (http:// or https://)
        spec: String,

        /// HTTP method (e.g., GET, post)
        #[arg(long, short)]
        method: String,

        /// Absolute request URL
        #[arg(long, short)]
        url: String,

        /// Base URL for relative servers
        #[arg(long)]
        base_url: Option<String>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a response against the operation its request targets
    ValidateResponse {
        /// Spec source: file path or URL (http:// or https://)
        spec: String,

        #[command(flatten)]
        message: MessageArgs,

        /// Response status code
        #[arg(long, short)]
        status: u16,

        /// Validate headers declared on the response
        #[arg(long)]
        validate_headers: bool,
    },

    /// Validate a request against the operation it targets
    ValidateRequest {
        /// Spec source: file path or URL (http:// or https://)
        spec: String,

        #[command(flatten)]
        message: MessageArgs,
    },
}

/// Options shared by the validate commands.
#[derive(Args)]
struct MessageArgs {
    /// HTTP method of the request
    #[arg(long, short)]
    method: String,

    /// Absolute request URL, query string included
    #[arg(long, short)]
    url: String,

    /// Base URL for relative servers
    #[arg(long)]
    base_url: Option<String>,

    /// Content type of the body (default: application/json when a body is given)
    #[arg(long)]
    content_type: Option<String>,

    /// File holding the message body
    #[arg(long)]
    body: Option<PathBuf>,

    /// Message header as NAME:VALUE (repeatable)
    #[arg(long = "header", short = 'H')]
    headers: Vec<String>,

    /// Output results as JSON (for automation)
    #[arg(long)]
    json: bool,

    /// Strict mode: reject unknown fields (default: false)
    #[arg(long, default_value_t = false, action = clap::ArgAction::Set)]
    strict: bool,
}

impl MessageArgs {
    fn options(&self) -> ValidatorOptions {
        let options = ValidatorOptions::new().strict(self.strict);
        match &self.base_url {
            Some(base_url) => options.base_url(base_url.as_str()),
            None => options,
        }
    }

    fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or("application/json")
    }

    fn read_body(&self) -> Result<Option<Vec<u8>>, u8> {
        let Some(path) = &self.body else {
            return Ok(None);
        };
        std::fs::read(path).map(Some).map_err(|e| {
            report_error(self.json, &format!("reading {}: {}", path.display(), e));
            3u8
        })
    }

    fn parsed_headers(&self) -> Result<Vec<(&str, &str)>, u8> {
        self.headers
            .iter()
            .map(|raw| {
                raw.split_once(':')
                    .map(|(name, value)| (name.trim(), value.trim()))
                    .ok_or_else(|| {
                        report_error(self.json, &format!("invalid header {:?}, expected NAME:VALUE", raw));
                        2u8
                    })
            })
            .collect()
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Find {
            spec,
            method,
            url,
            base_url,
            pretty,
        } => run_find(&spec, &method, &url, base_url.as_deref(), pretty),

        Commands::ValidateResponse {
            spec,
            message,
            status,
            validate_headers,
        } => run_validate_response(&spec, &message, status, validate_headers),

        Commands::ValidateRequest { spec, message } => run_validate_request(&spec, &message),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load(source: &str, json_output: bool) -> Result<Spec, u8> {
    load_spec_auto(source).map_err(|e| {
        report_error(json_output, &format!("loading spec: {}", e));
        e.exit_code() as u8
    })
}

fn parse_request(method: &str, url: &str, json_output: bool) -> Result<Request, u8> {
    Request::from_url(method, url).map_err(|e| {
        report_error(json_output, &format!("invalid URL {}: {}", url, e));
        2u8
    })
}

fn run_find(
    source: &str,
    method: &str,
    url: &str,
    base_url: Option<&str>,
    pretty: bool,
) -> Result<(), u8> {
    let spec = load(source, false)?;
    let request = parse_request(method, url, false)?;

    let resolved = PathFinder::new(&spec)
        .with_base_url(base_url)
        .find(&request)
        .map_err(|e| {
            report_error(false, &e.to_string());
            1u8
        })?;

    let output = json!({
        "path": resolved.path.template,
        "method": resolved.operation.method,
        "operation_id": resolved.operation.operation_id,
        "server": resolved.server.url,
        "path_variables": resolved.path_result.variables,
        "server_variables": resolved.server_result.variables,
    });

    let rendered = if pretty {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string(&output)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;
    println!("{}", rendered);

    Ok(())
}

fn run_validate_response(
    source: &str,
    args: &MessageArgs,
    status: u16,
    validate_headers: bool,
) -> Result<(), u8> {
    let spec = load(source, args.json)?;
    let request = parse_request(&args.method, &args.url, args.json)?;

    let mut response = Response::new(status);
    match args.read_body()? {
        Some(body) => response = response.with_body(args.content_type(), body),
        None => response.mimetype = args.content_type.as_deref().map(normalize_mimetype),
    }
    for (name, value) in args.parsed_headers()? {
        response = response.with_header(name, value);
    }

    let options = args.options().validate_headers(validate_headers);
    let result = ResponseValidator::new(&spec, options).validate(&request, &response);
    report_result(args.json, &result.errors, result.data.as_ref())
}

fn run_validate_request(source: &str, args: &MessageArgs) -> Result<(), u8> {
    let spec = load(source, args.json)?;
    let mut request = parse_request(&args.method, &args.url, args.json)?;

    match args.read_body()? {
        Some(body) => request = request.with_body(args.content_type(), body),
        None => request.mimetype = args.content_type.as_deref().map(normalize_mimetype),
    }
    for (name, value) in args.parsed_headers()? {
        request = request.with_header(name, value);
    }

    let result = RequestValidator::new(&spec, args.options()).validate(&request);
    report_result(args.json, &result.errors, result.body.as_ref())
}

/// Print a validation outcome and map it to an exit code.
fn report_result(
    json_output: bool,
    errors: &[ValidationError],
    data: Option<&Value>,
) -> Result<(), u8> {
    if json_output {
        let output = json!({
            "valid": errors.is_empty(),
            "errors": errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "data": data,
        });
        println!("{}", output);
    } else if errors.is_empty() {
        println!("Valid");
    } else {
        eprintln!("Validation failed:");
        for error in errors {
            eprintln!("  {}", error);
        }
    }

    match errors.first() {
        None => Ok(()),
        Some(error) => Err(error.exit_code() as u8),
    }
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}
