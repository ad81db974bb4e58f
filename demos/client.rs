use argh::FromArgs;
use std::path::PathBuf;

mod messages;

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 3000;

#[derive(FromArgs)]
/// cropscan client for submitting scans and checking the server
struct ClientArgs {
    /// the host to connect to
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// command to execute: "scan" or "status"
    #[argh(subcommand)]
    command: ClientCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ClientCommands {
    Scan(ScanCommand),
    Status(StatusCommand),
}

#[derive(FromArgs)]
/// Classify images stored on the server's filesystem
#[argh(subcommand, name = "scan")]
struct ScanCommand {
    /// paths of the images, relative to the server's image root
    #[argh(positional)]
    image_paths: Vec<PathBuf>,
}

#[derive(FromArgs)]
/// Show the session state of the server
#[argh(subcommand, name = "status")]
struct StatusCommand {}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: ClientArgs = argh::from_env();

    let client = reqwest::Client::new();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    match args.command {
        ClientCommands::Scan(scan_command) => {
            let response = client
                .post(format!("http://{}/scan", addr))
                .json(&messages::ScanRequest {
                    image_paths: scan_command.image_paths,
                })
                .send()
                .await?;

            let result = response.json::<serde_json::Value>().await?;
            println!("Result: {}", serde_json::to_string_pretty(&result)?);
        }
        ClientCommands::Status(_) => {
            let status = client
                .get(format!("http://{}/status", addr))
                .send()
                .await?
                .json::<messages::StatusResponse>()
                .await?;

            println!(
                "Session {} ({} loads, {} classes)",
                status.state, status.loads, status.classes
            );
        }
    }

    Ok(())
}
