use std::path::{Path, PathBuf};

use clap::Parser;
use scim_engine::{
    config::EngineConfig,
    observability,
    scim::{
        FilterContext, PatchEngine, PatchOp, PatchRequest, ResourceTree, ScimErrorResponse,
        SchemaRegistry, parse_filter_with, translate, try_matches,
    },
};
use serde_json::Value;

/// CLI arguments for the SCIM engine
#[derive(Parser, Debug)]
#[command(version, about = "SCIM 2.0 filter and PATCH engine", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to config file (defaults to ./scim-engine.toml if it exists)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Parse a filter, print its canonical form and translated predicate
    Filter {
        /// SCIM filter expression
        expression: String,
        /// Resource type the filter applies to
        #[arg(short = 't', long, default_value = "User")]
        resource_type: String,
        /// JSON resource to evaluate the filter against
        #[arg(short, long)]
        resource: Option<PathBuf>,
    },
    /// Apply PATCH operations to a resource and print the result
    Patch {
        /// JSON resource to patch
        #[arg(short, long)]
        resource: PathBuf,
        /// PatchOp request, or a bare array of operations
        #[arg(short, long)]
        operations: PathBuf,
        /// Resource type of the resource
        #[arg(short = 't', long, default_value = "User")]
        resource_type: String,
    },
    /// Export the JSON schema for the configuration file
    Schema {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<String>,
    },
}

fn main() {
    let args = Args::parse();

    if let Command::Schema { output } = &args.command {
        run_schema_export(output.as_deref());
        return;
    }

    let config = load_config(args.config.as_deref()).unwrap_or_else(|e| fail(&e));
    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Warning: {}", e);
    }
    let registry = config.registry().unwrap_or_else(|e| fail(&e.to_string()));

    let outcome = match args.command {
        Command::Filter {
            expression,
            resource_type,
            resource,
        } => run_filter(
            &config,
            &registry,
            &expression,
            &resource_type,
            resource.as_deref(),
        ),
        Command::Patch {
            resource,
            operations,
            resource_type,
        } => run_patch(&config, &registry, &resource, &operations, &resource_type),
        Command::Schema { .. } => Ok(()),
    };

    if let Err(error) = outcome {
        match serde_json::to_string_pretty(&error) {
            Ok(body) => println!("{}", body),
            Err(_) => eprintln!("Error: {}", error.detail),
        }
        std::process::exit(1);
    }
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn load_config(explicit_path: Option<&str>) -> Result<EngineConfig, String> {
    let path = match explicit_path {
        Some(path) => {
            let path = PathBuf::from(path);
            if !path.exists() {
                return Err(format!("Config file not found: {}", path.display()));
            }
            Some(path)
        }
        None => Some(PathBuf::from("scim-engine.toml")).filter(|p| p.exists()),
    };

    match path {
        Some(path) => EngineConfig::from_file(&path).map_err(|e| e.to_string()),
        None => Ok(EngineConfig::default()),
    }
}

fn read_json(path: &Path) -> Result<Value, ScimErrorResponse> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        ScimErrorResponse::invalid_syntax(format!("Failed to read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&contents).map_err(|e| {
        ScimErrorResponse::invalid_syntax(format!("Invalid JSON in {}: {}", path.display(), e))
    })
}

fn load_resource(
    registry: &SchemaRegistry,
    resource_type: &str,
    path: &Path,
) -> Result<ResourceTree, ScimErrorResponse> {
    ResourceTree::from_json(registry, resource_type, read_json(path)?)
        .map_err(|e| ScimErrorResponse::invalid_syntax(e.to_string()))
}

fn print_json(value: &impl serde::Serialize) -> Result<(), ScimErrorResponse> {
    let body = serde_json::to_string_pretty(value)
        .map_err(|e| ScimErrorResponse::invalid_syntax(e.to_string()))?;
    println!("{}", body);
    Ok(())
}

fn run_filter(
    config: &EngineConfig,
    registry: &SchemaRegistry,
    expression: &str,
    resource_type: &str,
    resource: Option<&Path>,
) -> Result<(), ScimErrorResponse> {
    let filter = parse_filter_with(expression, &config.filter.limits())?;
    let ctx = FilterContext::from_config(registry, resource_type, &config.filter);
    let predicate = translate(&filter, &ctx)?;

    println!("{}", filter);
    print_json(&predicate)?;

    if let Some(path) = resource {
        let tree = load_resource(registry, resource_type, path)?;
        println!("matches: {}", try_matches(&filter, &tree, &ctx)?);
    }
    Ok(())
}

fn run_patch(
    config: &EngineConfig,
    registry: &SchemaRegistry,
    resource: &Path,
    operations: &Path,
    resource_type: &str,
) -> Result<(), ScimErrorResponse> {
    let tree = load_resource(registry, resource_type, resource)?;
    let request = match read_json(operations)? {
        ops @ Value::Array(_) => serde_json::from_value::<Vec<PatchOp>>(ops).map(PatchRequest::new),
        request => serde_json::from_value::<PatchRequest>(request),
    }
    .map_err(|e| ScimErrorResponse::invalid_syntax(e.to_string()))?;

    let patched = PatchEngine::new(registry)
        .with_limits(config.filter.limits())
        .apply_request(&tree, &request)?;
    print_json(&patched.to_json())
}

/// Export config JSON schema to file or stdout
fn run_schema_export(output: Option<&str>) {
    #[cfg(feature = "json-schema")]
    {
        let content = EngineConfig::json_schema_string().unwrap_or_else(|e| fail(&e.to_string()));
        match output {
            Some(path) => {
                std::fs::write(path, &content)
                    .unwrap_or_else(|e| fail(&format!("Failed to write to {}: {}", path, e)));
                eprintln!("Config JSON schema written to {}", path);
            }
            None => println!("{}", content),
        }
    }
    #[cfg(not(feature = "json-schema"))]
    {
        let _ = output;
        fail("JSON schema export requires the 'json-schema' feature");
    }
}
