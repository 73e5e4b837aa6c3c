use clap::{Parser, Subcommand};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use std::error::Error;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Parser)]
#[command(name = "mural")]
#[command(about = "A CLI for publishing news, documents and social reports")]
struct Cli {
    /// Base URL for the Mural service
    #[arg(long, default_value = "http://localhost:3000")]
    service_url: Url,

    /// Access token from `mural sign-in`
    #[arg(long, env = "MURAL_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and print an access token
    SignIn {
        email: String,
        #[arg(long, env = "MURAL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Manage news items
    #[command(subcommand)]
    News(NewsCommand),
    /// Manage institutional documents
    #[command(subcommand)]
    Documents(DocumentCommand),
    /// Publish a monthly social report
    Report {
        #[arg(short, long)]
        title: String,
        /// Month covered, as YYYY-MM
        #[arg(short, long)]
        month: String,
        #[arg(short, long)]
        description: Option<String>,
        file: PathBuf,
    },
    /// Show dashboard counters
    Summary,
}

#[derive(Subcommand)]
enum NewsCommand {
    /// List news; with a token, drafts are included
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Only with a token: all, published or draft
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        search: Option<String>,
    },
    /// Create a news item
    Create {
        #[arg(short, long)]
        title: String,
        #[arg(short, long, default_value = "")]
        content: String,
        #[arg(long)]
        external_link: Option<String>,
        /// Publish right away instead of saving a draft
        #[arg(long)]
        publish: bool,
        /// Image file to upload
        #[arg(long, conflicts_with = "image_url")]
        image: Option<PathBuf>,
        /// Externally hosted image
        #[arg(long)]
        image_url: Option<String>,
    },
    Publish { id: i64 },
    /// Move a published item back to draft
    Unpublish { id: i64 },
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum DocumentCommand {
    List {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    Upload {
        #[arg(short, long)]
        title: String,
        #[arg(short, long)]
        category: String,
        #[arg(short, long)]
        description: Option<String>,
        file: PathBuf,
    },
    Delete { id: i64 },
}

#[derive(Deserialize)]
struct SignInResponse {
    access_token: String,
    role: String,
}

struct Api {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl Api {
    fn endpoint(&self, path: &str) -> Result<Url, Box<dyn Error>> {
        Ok(self.base.join(path)?)
    }

    fn get(&self, path: &str) -> Result<RequestBuilder, Box<dyn Error>> {
        Ok(self.authorized(self.client.get(self.endpoint(path)?)))
    }

    fn post(&self, path: &str) -> Result<RequestBuilder, Box<dyn Error>> {
        Ok(self.authorized(self.client.post(self.endpoint(path)?)))
    }

    fn delete(&self, path: &str) -> Result<RequestBuilder, Box<dyn Error>> {
        Ok(self.authorized(self.client.delete(self.endpoint(path)?)))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn require_token(&self) -> Result<(), Box<dyn Error>> {
        if self.token.is_none() {
            return Err("this command needs --token or MURAL_TOKEN".into());
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let api = Api {
        client: Client::new(),
        base: cli.service_url,
        token: cli.token,
    };

    match cli.command {
        Commands::SignIn { email, password } => sign_in(&api, &email, &password).await?,
        Commands::News(command) => news(&api, command).await?,
        Commands::Documents(command) => documents(&api, command).await?,
        Commands::Report {
            title,
            month,
            description,
            file,
        } => {
            api.require_token()?;
            let mut form = Form::new()
                .text("title", title)
                .text("month", month)
                .part("file", file_part(&file).await?);
            if let Some(description) = description {
                form = form.text("description", description);
            }
            let created = expect_json(api.post("/api/v1/admin/reports")?.multipart(form)).await?;
            println!(
                "Report published with ID: {} ({})",
                created["id"], created["date"]
            );
        }
        Commands::Summary => {
            api.require_token()?;
            let summary = expect_json(api.get("/api/v1/admin/summary")?).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

async fn sign_in(api: &Api, email: &str, password: &str) -> Result<(), Box<dyn Error>> {
    let response = api
        .post("/api/v1/auth/sign-in")?
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await?;
    let signed_in: SignInResponse = check(response).await?.json().await?;
    eprintln!("Signed in as {email} ({})", signed_in.role);
    println!("{}", signed_in.access_token);
    Ok(())
}

async fn news(api: &Api, command: NewsCommand) -> Result<(), Box<dyn Error>> {
    match command {
        NewsCommand::List {
            page,
            status,
            search,
        } => {
            let request = if api.token.is_some() {
                let mut query = vec![("page", page.to_string())];
                query.extend(status.map(|s| ("status", s)));
                query.extend(search.map(|s| ("search", s)));
                api.get("/api/v1/admin/news")?.query(&query)
            } else {
                api.get("/api/v1/news")?.query(&[("page", page)])
            };
            print_listing(&expect_json(request).await?, |item| {
                format!("{:>5}  {:<9}  {}", item["id"], text(&item["status"]), text(&item["title"]))
            });
        }
        NewsCommand::Create {
            title,
            content,
            external_link,
            publish,
            image,
            image_url,
        } => {
            api.require_token()?;
            let status = if publish { "published" } else { "draft" };
            let mut form = Form::new()
                .text("title", title)
                .text("content", content)
                .text("status", status);
            if let Some(link) = external_link {
                form = form.text("external_link", link);
            }
            if let Some(url) = image_url {
                form = form.text("image_url", url);
            }
            if let Some(path) = image {
                form = form.part("image", file_part(&path).await?);
            }
            let created = expect_json(api.post("/api/v1/admin/news")?.multipart(form)).await?;
            println!(
                "News item created with ID: {} ({})",
                created["id"],
                text(&created["status"])
            );
        }
        NewsCommand::Publish { id } => {
            api.require_token()?;
            expect_json(api.post(&format!("/api/v1/admin/news/{id}/publish"))?).await?;
            println!("News item {id} published");
        }
        NewsCommand::Unpublish { id } => {
            api.require_token()?;
            expect_json(api.post(&format!("/api/v1/admin/news/{id}/draft"))?).await?;
            println!("News item {id} moved to drafts");
        }
        NewsCommand::Delete { id } => {
            api.require_token()?;
            check(api.delete(&format!("/api/v1/admin/news/{id}"))?.send().await?).await?;
            println!("News item {id} deleted");
        }
    }
    Ok(())
}

async fn documents(api: &Api, command: DocumentCommand) -> Result<(), Box<dyn Error>> {
    match command {
        DocumentCommand::List {
            category,
            search,
            page,
        } => {
            let mut query = vec![("page", page.to_string())];
            query.extend(category.map(|c| ("category", c)));
            query.extend(search.map(|s| ("search", s)));
            let listing = expect_json(api.get("/api/v1/documents")?.query(&query)).await?;
            print_listing(&listing, |item| {
                format!(
                    "{:>5}  {:<16}  {}  {}",
                    item["id"],
                    text(&item["category"]),
                    text(&item["title"]),
                    text(&item["file_url"])
                )
            });
        }
        DocumentCommand::Upload {
            title,
            category,
            description,
            file,
        } => {
            api.require_token()?;
            let mut form = Form::new()
                .text("title", title)
                .text("category", category)
                .part("file", file_part(&file).await?);
            if let Some(description) = description {
                form = form.text("description", description);
            }
            let created = expect_json(api.post("/api/v1/admin/documents")?.multipart(form)).await?;
            println!("Document uploaded with ID: {}", created["id"]);
        }
        DocumentCommand::Delete { id } => {
            api.require_token()?;
            check(api.delete(&format!("/api/v1/admin/documents/{id}"))?.send().await?).await?;
            println!("Document {id} deleted");
        }
    }
    Ok(())
}

async fn file_part(path: &Path) -> Result<Part, Box<dyn Error>> {
    let bytes = tokio::fs::read(path).await?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload")
        .to_string();
    Ok(Part::bytes(bytes).file_name(filename))
}

async fn check(response: Response) -> Result<Response, Box<dyn Error>> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    let message = body["error"].as_str().unwrap_or("no details");
    Err(format!("request failed ({status}): {message}").into())
}

async fn expect_json(request: RequestBuilder) -> Result<Value, Box<dyn Error>> {
    let response = check(request.send().await?).await?;
    Ok(response.json().await?)
}

fn text(value: &Value) -> &str {
    value.as_str().unwrap_or("")
}

fn print_listing(listing: &Value, line: impl Fn(&Value) -> String) {
    match listing["state"].as_str() {
        Some("populated") => {
            for item in listing["items"].as_array().into_iter().flatten() {
                println!("{}", line(item));
            }
            println!(
                "page {} of {} ({} total)",
                listing["page"], listing["total_pages"], listing["total"]
            );
        }
        _ => println!("Nothing here yet"),
    }
}
