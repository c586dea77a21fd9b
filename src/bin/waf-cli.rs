use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "waf-cli")]
#[command(about = "Management CLI for the WAF gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    /// Header carrying the profile selector.
    #[arg(long, default_value = "X-WAF-Profile")]
    profile_header: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway liveness
    Health,
    /// Drop the cached engine of a profile
    Invalidate {
        /// Profile id; the gateway default when omitted
        profile: Option<String>,
    },
    /// List profiles with a cached engine
    Profiles,
    /// Send a request through inspection and print the verdict
    Check {
        #[arg(short, long)]
        profile: Option<String>,

        /// Extra request header, `Name:Value`; repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{}/health", cli.url)).send().await?;
            print_text(res).await?;
        }
        Commands::Invalidate { profile } => {
            let url = remove_url(&cli.url, profile.as_deref())?;
            let res = client.get(url).send().await?;
            print_text(res).await?;
        }
        Commands::Profiles => {
            let res = client.get(format!("{}/profiles", cli.url)).send().await?;
            print_json(res).await?;
        }
        Commands::Check { profile, headers } => {
            let mut map = parse_headers(&headers)?;
            if let Some(profile) = profile {
                map.insert(
                    HeaderName::from_bytes(cli.profile_header.as_bytes())?,
                    HeaderValue::from_str(&profile)?,
                );
            }
            let res = client
                .post(format!("{}/pre", cli.url))
                .headers(map)
                .send()
                .await?;
            let status = res.status();
            let body = res.text().await?;
            if status.is_success() {
                println!("continue ({})", status);
            } else {
                println!("interrupted ({}): {}", status, body);
            }
        }
    }

    Ok(())
}

/// `/remove` or `/remove/{profile}` under `base`, with the profile
/// percent-encoded as a single path segment.
fn remove_url(base: &str, profile: Option<&str>) -> Result<Url, Box<dyn std::error::Error>> {
    let mut url = Url::parse(base)?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| format!("'{}' cannot be used as a base URL", base))?;
        segments.pop_if_empty().push("remove");
        if let Some(profile) = profile {
            segments.push(profile);
        }
    }
    Ok(url)
}

fn parse_headers(raw: &[String]) -> Result<HeaderMap, Box<dyn std::error::Error>> {
    let mut map = HeaderMap::new();
    for entry in raw {
        let (name, value) = entry
            .split_once(':')
            .ok_or_else(|| format!("header '{}' is not Name:Value", entry))?;
        map.append(
            HeaderName::from_bytes(name.trim().as_bytes())?,
            HeaderValue::from_str(value.trim())?,
        );
    }
    Ok(map)
}

async fn print_text(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        eprintln!("Response: {}", text);
        return Ok(());
    }
    println!("{}", text);
    Ok(())
}

async fn print_json(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
