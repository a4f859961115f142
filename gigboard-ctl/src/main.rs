use anyhow::Context;
use gigboard_api::{AuthToken, CommentNode, GigId, NewSession, UserId, Uuid};

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long, env = "GIGBOARD_HOST")]
    host: String,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Create a user
    CreateUser {
        /// Username
        name: String,

        /// Initial password
        initial_password: String,
    },

    /// Open a session, printing its token
    Login {
        /// Username
        name: String,

        /// Password
        password: String,

        /// Name of the device the session is for
        #[structopt(long, default_value = "gigboard-ctl")]
        device: String,
    },

    /// Print the comment threads of a gig that are visible to the GIGBOARD_TOKEN session
    Comments {
        /// Id of the gig
        gig: String,
    },
}

fn token_from_env(var: &str) -> anyhow::Result<AuthToken> {
    let tok = std::env::var(var).with_context(|| format!("retrieving {var} environment variable"))?;
    let tok = Uuid::try_parse(&tok).with_context(|| format!("parsing {var} as an auth token"))?;
    Ok(AuthToken(tok))
}

/// Turns error responses into errors carrying the server's explanation
async fn check(resp: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.bytes().await.context("reading error response body")?;
    match gigboard_api::Error::parse(&body) {
        Ok(err) => Err(anyhow::anyhow!("server refused the request: {err}")),
        Err(_) => Err(anyhow::anyhow!("server answered with status {status}")),
    }
}

fn print_thread(thread: &CommentNode) {
    for (depth, c) in thread.flatten() {
        println!(
            "{:indent$}[{}] {}: {}",
            "",
            c.created_at.format("%Y-%m-%d %H:%M"),
            c.author.username,
            c.text,
            indent = depth * 2,
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = <Opt as structopt::StructOpt>::from_args();

    let client = reqwest::Client::new();

    match opt.cmd {
        Command::CreateUser {
            name,
            initial_password,
        } => {
            check(
                client
                    .post(format!("{}/api/admin/create-user", opt.host))
                    .json(&gigboard_api::NewUser::new(
                        UserId(Uuid::new_v4()),
                        name,
                        initial_password,
                    ))
                    .bearer_auth(token_from_env("ADMIN_TOKEN")?.0)
                    .send()
                    .await?,
            )
            .await?;
        }
        Command::Login {
            name,
            password,
            device,
        } => {
            let tok: AuthToken = check(
                client
                    .post(format!("{}/api/auth", opt.host))
                    .json(&NewSession {
                        user: name,
                        password,
                        device,
                    })
                    .send()
                    .await?,
            )
            .await?
            .json()
            .await
            .context("parsing auth token")?;
            println!("{}", tok.0);
        }
        Command::Comments { gig } => {
            let gig = GigId::parse(&gig)?;
            let body = check(
                client
                    .get(format!("{}/api/gigs/{}/comments", opt.host, gig.0))
                    .bearer_auth(token_from_env("GIGBOARD_TOKEN")?.0)
                    .send()
                    .await?,
            )
            .await?
            .bytes()
            .await
            .context("reading comment threads")?;
            let threads: Vec<CommentNode> =
                gigboard_api::json_from_slice(&body).context("parsing comment threads")?;
            for t in &threads {
                print_thread(t);
            }
        }
    }

    Ok(())
}
