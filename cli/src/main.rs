use base64::{Engine as _, engine::general_purpose::STANDARD};
use clap::{Parser, Subcommand};
use reqwest::blocking::multipart::Form;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use vanish_core::crypto::generate_encoded_key;
use vanish_shared::{ErrorDetail, HealthStatus, SecretLink, SecretResponse, sanitize_filename};

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080";

#[derive(Parser, Debug)]
struct Cli {
    /// Base URL of the vanish server
    #[arg(long, global = true, env = "VANISH_SERVER", default_value = DEFAULT_SERVER_URL)]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a new secret to the server
    Send {
        /// The message to store
        ///
        /// This can be any UTF-8 text. Consider quoting the value
        /// if it contains spaces or special characters.
        #[arg(short, long, value_name = "TEXT")]
        text: Option<String>,

        /// A file to attach to the secret
        #[arg(short, long, value_name = "PATH")]
        file: Option<PathBuf>,

        /// Seconds until the secret expires if nobody reads it
        #[arg(long, value_name = "SECONDS", default_value_t = 3600)]
        ttl: u64,
    },

    /// Retrieve a secret from the server. The secret is deleted once read.
    Recv {
        /// Secret identifier or full URL
        ///
        /// This may be a raw secret ID or the URL printed by the
        /// `send` command.
        #[arg(long, value_name = "ID|URL")]
        source: String,

        /// Directory to write an attached file into
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        out: PathBuf,
    },

    /// Check whether the server and its backing store are up
    Health,

    /// Print a freshly generated value for the server's SECRET_KEY
    Keygen,
}

fn main() {
    let cli = Cli::parse();

    if run(cli).is_err() {
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let server = cli.server.trim_end_matches('/').to_string();
    let client = reqwest::blocking::Client::new();

    match cli.command {
        Command::Send { text, file, ttl } => {
            if text.is_none() && file.is_none() {
                println!("At least one of --text or --file must be provided");
                return Err("nothing to send".into());
            }

            if ttl == 0 {
                println!("--ttl must be a positive number of seconds");
                return Err("invalid ttl".into());
            }

            let mut form = Form::new().text("ttl", ttl.to_string());

            if let Some(text) = text {
                form = form.text("message", text);
            }

            if let Some(path) = file {
                form = form.file("file", &path).map_err(|e| {
                    println!("Failed to read {}: {e}", path.display());
                    e
                })?;
            }

            let link: SecretLink =
                reqwest_json(client.post(format!("{server}/api/secrets/")).multipart(form))
                    .map_err(|e| {
                        println!("Failed to create secret: {e}");
                        e
                    })?;

            println!("{server}{}", link.url);
        }
        Command::Recv { source, out } => {
            let Some(secret_id) = source
                .split(['#', '?'])
                .next()
                .and_then(|s| s.trim_end_matches('/').rsplit('/').next())
                .filter(|s| !s.is_empty())
            else {
                println!("Could not find the secret id in the secret link.");
                return Err("missing secret id".into());
            };

            let secret: SecretResponse =
                reqwest_json(client.get(format!("{server}/api/secrets/{secret_id}"))).map_err(
                    |e| {
                        println!("Failed to retrieve secret: {e}");
                        e
                    },
                )?;

            if let Some(message) = &secret.message {
                println!("Message: {message}");
            }

            if let Some(data) = &secret.file_data {
                let bytes = STANDARD.decode(data).map_err(|e| {
                    println!("Failed to decode the attached file: {e}");
                    e
                })?;

                let name = secret
                    .file_name
                    .as_deref()
                    .and_then(|n| sanitize_filename(n).ok())
                    .unwrap_or_else(|| format!("{secret_id}.bin"));
                let path = out.join(name);

                let mut target = OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&path)
                    .map_err(|e| {
                        println!("Failed to create {}: {e}", path.display());
                        e
                    })?;
                target.write_all(&bytes)?;

                println!(
                    "File: {} ({} bytes, {})",
                    path.display(),
                    bytes.len(),
                    secret.file_mime.as_deref().unwrap_or("unknown type")
                );
            }
        }
        Command::Health => {
            let status: HealthStatus = reqwest_json(client.get(format!("{server}/healthcheck")))
                .map_err(|e| {
                    println!("Server is unhealthy: {e}");
                    e
                })?;
            println!("Server status: {}", status.status);
        }
        Command::Keygen => {
            println!("{}", generate_encoded_key());
        }
    }
    Ok(())
}

/// Sends the request and decodes a JSON body. Non-2xx responses become an
/// error carrying the server's `detail` message when there is one.
fn reqwest_json<T: serde::de::DeserializeOwned>(
    req: reqwest::blocking::RequestBuilder,
) -> Result<T, Box<dyn std::error::Error>> {
    let response = req.send()?;
    let status = response.status();

    if status.is_success() {
        return Ok(response.json()?);
    }

    let detail = response
        .json::<ErrorDetail>()
        .map(|e| e.detail)
        .unwrap_or_else(|_| status.to_string());
    Err(format!("{status}: {detail}").into())
}
