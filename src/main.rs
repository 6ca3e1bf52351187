// Copyright PingCAP Inc. 2025.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; version 2 of the License.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use clap::{Parser, Subcommand};
use finch::config::Config;
use finch::observability::{health, metrics, tracing_setup};
use finch::storage::{Channel, Page, Post};
use finch::Site;

#[derive(Parser, Debug)]
#[command(name = "finch")]
#[command(about = "Administer a finch link and note store", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "finch.toml")]
    config: String,

    /// SQLite database file (overrides storage.path)
    #[arg(long)]
    db: Option<String>,

    /// Storage backend, "sqlite" or "in-memory" (overrides storage.backend)
    #[arg(long)]
    backend: Option<String>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Create a user
    CreateUser {
        username: String,
        #[arg(long, env = "FINCH_PASSWORD")]
        password: String,
    },
    /// List users
    Users,
    /// Add channels to a user; existing slugs are returned as-is
    AddChannels {
        username: String,
        #[arg(required = true)]
        labels: Vec<String>,
    },
    /// List a user's channels
    Channels { username: String },
    /// Add a post, optionally filed under some of the author's channels
    Post {
        username: String,
        body: String,
        /// Channel slug, may be repeated
        #[arg(long = "channel")]
        channels: Vec<String>,
    },
    /// List posts, newest first
    Posts {
        #[arg(long)]
        user: Option<String>,
        /// Channel slug; requires --user
        #[arg(long, requires = "user")]
        channel: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Show one post by uuid
    Show { uuid: String },
    /// Substring search over post bodies, ignoring ASCII case
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Delete a post by uuid
    DeletePost { uuid: String },
    /// Delete a channel; its posts stay
    DeleteChannel { username: String, slug: String },
    /// Print dispatcher counters and Prometheus metrics
    Metrics,
    /// Check that storage answers through the dispatcher
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_setup::init_tracing_from_env();

    let args = Args::parse();

    let mut cfg = Config::load_or_default(&args.config)?;

    // Command line args override config file
    if let Some(db) = args.db {
        cfg.storage.path = db;
    }
    if let Some(backend) = args.backend {
        cfg.storage.backend = backend;
    }

    let (site, dispatcher) = Site::from_config(&cfg)?;

    let outcome = run(&site, &cfg, args.command).await;

    drop(site);
    let closed = dispatcher.shutdown().await;

    outcome?;
    closed?;
    Ok(())
}

async fn run(site: &Site, cfg: &Config, cmd: Cmd) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        Cmd::CreateUser { username, password } => {
            let user = site.create_user(&username, &password).await?;
            println!("created user {} (id {})", user.username, user.id);
        }
        Cmd::Users => {
            for user in site.get_all_users().await? {
                println!("{}\t{}", user.id, user.username);
            }
        }
        Cmd::AddChannels { username, labels } => {
            let user = site.get_user(&username).await?;
            for channel in site.add_channels(&user, &labels).await? {
                print_channel(&channel);
            }
        }
        Cmd::Channels { username } => {
            let user = site.get_user(&username).await?;
            for channel in site.get_user_channels(&user).await? {
                print_channel(&channel);
            }
        }
        Cmd::Post {
            username,
            body,
            channels,
        } => {
            let user = site.get_user(&username).await?;
            let mut targets = Vec::with_capacity(channels.len());
            for slug in &channels {
                targets.push(site.get_channel(&user, slug).await?);
            }
            let post = site.add_post(&user, &body, &targets).await?;
            println!("{}{}", cfg.base_url.trim_end_matches('/'), post.url());
        }
        Cmd::Posts {
            user,
            channel,
            limit,
            offset,
        } => {
            let page = Page::new(limit.unwrap_or(cfg.items_per_page), offset);
            let posts = match (user, channel) {
                (Some(username), Some(slug)) => {
                    let user = site.get_user(&username).await?;
                    let channel = site.get_channel(&user, &slug).await?;
                    site.get_all_posts_in_channel(&channel, page).await?
                }
                (Some(username), None) => {
                    let user = site.get_user(&username).await?;
                    site.get_all_user_posts(&user, page).await?
                }
                _ => site.get_all_posts(page).await?,
            };
            posts.iter().for_each(print_post);
        }
        Cmd::Show { uuid } => {
            let post = site.get_post_by_uuid(&uuid).await?;
            print_post(&post);
            println!();
            println!("{}", post.body);
        }
        Cmd::Search {
            query,
            limit,
            offset,
        } => {
            let page = Page::new(limit.unwrap_or(cfg.items_per_page), offset);
            site.search_posts(&query, page)
                .await?
                .iter()
                .for_each(print_post);
        }
        Cmd::DeletePost { uuid } => {
            let post = site.get_post_by_uuid(&uuid).await?;
            site.delete_post(&post).await?;
            println!("deleted post {}", post.uuid);
        }
        Cmd::DeleteChannel { username, slug } => {
            let user = site.get_user(&username).await?;
            let channel = site.get_channel(&user, &slug).await?;
            site.delete_channel(&channel).await?;
            println!("deleted channel {}/{}", user.username, channel.slug);
        }
        Cmd::Metrics => {
            let report = health::get_site_report(site).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            println!("{}", String::from_utf8_lossy(&metrics::gather_metrics()));
        }
        Cmd::Health => {
            let status = health::get_health_status(site).await;
            println!("{}", serde_json::to_string_pretty(&status)?);
            if status.status != "healthy" {
                return Err("storage is unhealthy".into());
            }
        }
    }
    Ok(())
}

fn print_channel(channel: &Channel) {
    println!("{}\t{}\t{}", channel.id, channel.slug, channel.label);
}

fn print_post(post: &Post) {
    let slugs: Vec<&str> = post.channels.iter().map(|c| c.slug.as_str()).collect();
    let first_line = post.body.lines().next().unwrap_or_default();
    println!(
        "{}\t{}\t{}\t[{}]\t{}",
        post.uuid,
        post.time().to_rfc3339(),
        post.user.username,
        slugs.join(","),
        first_line
    );
}
