//! ConnectSphere 命令行客户端
//!
//! 每次执行一个子命令，结果以 JSON 输出到 stdout。
//! 除 signup / login 外的命令需要用 `--as <uid>` 指定操作用户（从本地库恢复会话）。

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use connectsphere_core::sphere::auth::IdpProvider;
use connectsphere_core::sphere::friend::FriendListener;
use connectsphere_core::sphere::post::{NewPost, PostImage};
use connectsphere_core::sphere::user::{parse_skills, ProfileUpdate};
use connectsphere_core::{ClientConfig, Principal, SphereClient};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// ConnectSphere CLI
#[derive(Parser, Debug)]
#[command(name = "sphere-cli")]
#[command(about = "ConnectSphere CLI 客户端 - 社交关系、动态和聊天", long_about = None)]
struct Cli {
    /// 本地文档库 SQLite URL
    #[arg(long, default_value = "sqlite://sphere.db?mode=rwc")]
    db: String,

    /// 操作用户 uid
    #[arg(long = "as", global = true)]
    acting_uid: Option<String>,

    /// 身份服务地址
    #[arg(long, default_value = "https://identitytoolkit.googleapis.com")]
    identity_url: String,

    /// 身份服务 API key
    #[arg(long, default_value = "")]
    api_key: String,

    /// 帖子配图存放目录
    #[arg(long, default_value = "sphere-blobs")]
    blob_root: String,

    /// 配图对外访问前缀，不指定时返回 file:// URL
    #[arg(long)]
    blob_base_url: Option<String>,

    /// 日志级别（默认: info,connectsphere_core=debug）
    #[arg(long, default_value = "info,connectsphere_core=debug")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 邮箱注册
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: String,
    },
    /// 邮箱密码登录，或 --idp google|github --token <凭证>
    Login {
        #[arg(long, required_unless_present = "idp")]
        email: Option<String>,
        #[arg(long, requires = "email")]
        password: Option<String>,
        #[arg(long, requires = "token")]
        idp: Option<IdpProvider>,
        #[arg(long)]
        token: Option<String>,
    },
    /// 查看资料（默认自己），--posts 同时列出帖子
    Profile {
        uid: Option<String>,
        #[arg(long)]
        posts: bool,
    },
    /// 编辑自己的资料
    EditProfile(EditProfileArgs),
    /// 好友推荐
    Suggest,
    /// 查看与某用户的关系
    Relation { uid: String },
    /// 好友申请操作
    Request {
        #[command(subcommand)]
        action: RequestAction,
    },
    /// 收到的好友申请
    Requests,
    /// 好友列表
    Friends,
    /// 动态流
    Feed,
    /// 帖子操作
    Post {
        #[command(subcommand)]
        action: PostAction,
    },
    /// 评论操作
    Comment {
        #[command(subcommand)]
        action: CommentAction,
    },
    /// 一对一聊天
    Chat {
        #[command(subcommand)]
        action: ChatAction,
    },
    /// 群聊
    Group {
        #[command(subcommand)]
        action: GroupAction,
    },
}

#[derive(ClapArgs, Debug)]
struct EditProfileArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    bio: Option<String>,
    #[arg(long)]
    location: Option<String>,
    #[arg(long)]
    avatar: Option<String>,
    #[arg(long)]
    cover_image: Option<String>,
    /// 逗号分隔，例如 "rust, sql"
    #[arg(long)]
    skills: Option<String>,
}

#[derive(Subcommand, Debug)]
enum RequestAction {
    Send { uid: String },
    Cancel { uid: String },
    /// 接受 uid 发来的申请；--id 按申请 id 处理
    Accept {
        #[arg(required_unless_present = "id")]
        uid: Option<String>,
        #[arg(long)]
        id: Option<String>,
    },
    Decline {
        #[arg(required_unless_present = "id")]
        uid: Option<String>,
        #[arg(long)]
        id: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum PostAction {
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        /// 配图文件路径
        #[arg(long)]
        image: Option<PathBuf>,
    },
    Edit {
        post_id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
    },
    Like { post_id: String },
    Delete { post_id: String },
}

#[derive(Subcommand, Debug)]
enum CommentAction {
    Add { post_id: String, text: String },
    Delete { comment_id: String },
}

#[derive(Subcommand, Debug)]
enum ChatAction {
    Send { uid: String, text: String },
    History { uid: String },
    /// 交互式聊天：stdin 每行发送一条，实时打印会话
    Watch { uid: String },
}

#[derive(Subcommand, Debug)]
enum GroupAction {
    Create { name: String },
    List,
    Send { group_id: String, text: String },
    History { group_id: String },
}

/// 初始化日志（同时输出到 stderr 和文件）
fn init_logger(log_level: &str) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG，否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("sphere-debug.log")
        .context("无法创建日志文件 sphere-debug.log")?;

    // stdout 留给 JSON 结果，控制台日志写 stderr
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("[CLI] 📝 日志已同时输出到控制台和文件: sphere-debug.log");
    Ok(())
}

/// 好友监听器：把回调打到日志
struct CliFriendListener;

#[async_trait::async_trait]
impl FriendListener for CliFriendListener {
    async fn on_friend_list_changed(&self, owner_uid: String, friends_json: String) {
        info!("[CLI/Friend] 👥 {} 的好友列表变更: {}", owner_uid, friends_json);
    }

    async fn on_friend_request_list_changed(&self, to_uid: String, requests_json: String) {
        info!("[CLI/Friend] 📝 {} 的好友申请变更: {}", to_uid, requests_json);
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("序列化输出失败")?);
    Ok(())
}

async fn acting(client: &SphereClient, uid: &Option<String>) -> Result<Principal> {
    let uid = uid
        .as_deref()
        .context("该命令需要 --as <uid> 指定操作用户")?;
    client.restore_session(uid).await
}

async fn run(client: &SphereClient, cli: Cli) -> Result<()> {
    match cli.command {
        Command::Signup {
            email,
            password,
            name,
        } => {
            let p = client.sign_up(&email, &password, &name).await?;
            info!("[CLI] ✅ 注册成功！用户ID: {}", p.uid);
            print_json(&p)
        }
        Command::Login {
            email,
            password,
            idp,
            token,
        } => {
            let p = match (idp, token) {
                (Some(provider), Some(token)) => client.sign_in_with_idp(provider, &token).await?,
                _ => {
                    let email = email.context("缺少 --email")?;
                    let password = password.context("缺少 --password")?;
                    client.sign_in_with_password(&email, &password).await?
                }
            };
            info!("[CLI] ✅ 登录成功！用户ID: {}", p.uid);
            print_json(&p)
        }
        Command::Profile { uid, posts } => {
            let me = acting(client, &cli.acting_uid).await?;
            let uid = uid.unwrap_or_else(|| me.uid.clone());
            let profile = client.users().get_profile(&uid).await?;
            info!(
                "[CLI] 资料完成度: {}%",
                profile.completion_percent()
            );
            if posts {
                let list = client.feed().user_posts(&uid).await?;
                print_json(&serde_json::json!({ "profile": profile, "posts": list }))
            } else {
                print_json(&profile)
            }
        }
        Command::EditProfile(args) => {
            let me = acting(client, &cli.acting_uid).await?;
            let update = ProfileUpdate {
                name: args.name,
                title: args.title,
                bio: args.bio,
                location: args.location,
                avatar: args.avatar,
                cover_image: args.cover_image,
                socials: None,
                skills: args.skills.as_deref().map(parse_skills),
            };
            print_json(&client.users().update_profile(&me, update).await?)
        }
        Command::Suggest => {
            let me = acting(client, &cli.acting_uid).await?;
            print_json(&client.users().suggestions(&me).await?)
        }
        Command::Relation { uid } => {
            let me = acting(client, &cli.acting_uid).await?;
            let state = client.relationships().relation_state(&me, &uid).await?;
            print_json(&serde_json::json!({ "uid": uid, "state": state.as_str() }))
        }
        Command::Request { action } => {
            let me = acting(client, &cli.acting_uid).await?;
            let rel = client.relationships();
            match action {
                RequestAction::Send { uid } => print_json(&rel.send_request(&me, &uid).await?),
                RequestAction::Cancel { uid } => {
                    rel.cancel_request(&me, &uid).await?;
                    print_json(&serde_json::json!({ "cancelled": uid }))
                }
                RequestAction::Accept { uid, id } => {
                    match (id, uid) {
                        (Some(id), _) => rel.accept_request_by_id(&me, &id).await?,
                        (None, Some(uid)) => rel.accept_request(&me, &uid).await?,
                        (None, None) => anyhow::bail!("需要 uid 或 --id"),
                    }
                    print_json(&rel.list_friends(&me.uid).await?)
                }
                RequestAction::Decline { uid, id } => {
                    match (id, uid) {
                        (Some(id), _) => rel.decline_request_by_id(&me, &id).await?,
                        (None, Some(uid)) => rel.decline_request(&me, &uid).await?,
                        (None, None) => anyhow::bail!("需要 uid 或 --id"),
                    }
                    print_json(&rel.incoming_requests(&me.uid).await?)
                }
            }
        }
        Command::Requests => {
            let me = acting(client, &cli.acting_uid).await?;
            print_json(&client.relationships().incoming_requests(&me.uid).await?)
        }
        Command::Friends => {
            let me = acting(client, &cli.acting_uid).await?;
            print_json(&client.relationships().list_friends(&me.uid).await?)
        }
        Command::Feed => {
            let me = acting(client, &cli.acting_uid).await?;
            print_json(&client.feed().build_feed(&me).await?)
        }
        Command::Post { action } => {
            let me = acting(client, &cli.acting_uid).await?;
            let posts = client.posts();
            match action {
                PostAction::Create {
                    title,
                    content,
                    image,
                } => {
                    let image = match image {
                        Some(path) => {
                            let bytes = tokio::fs::read(&path)
                                .await
                                .context(format!("读取配图失败: {}", path.display()))?;
                            let file_name = path
                                .file_name()
                                .map(|n| n.to_string_lossy().into_owned())
                                .unwrap_or_else(|| "image".to_string());
                            Some(PostImage { file_name, bytes })
                        }
                        None => None,
                    };
                    let post = posts
                        .create_post(
                            &me,
                            NewPost {
                                title,
                                content,
                                image,
                            },
                        )
                        .await?;
                    print_json(&post)
                }
                PostAction::Edit {
                    post_id,
                    title,
                    content,
                } => print_json(&posts.update_post(&me, &post_id, &title, &content).await?),
                PostAction::Like { post_id } => {
                    let likes = posts.toggle_like(&me, &post_id).await?;
                    print_json(&serde_json::json!({ "postId": post_id, "likes": likes }))
                }
                PostAction::Delete { post_id } => {
                    posts.delete_post(&me, &post_id).await?;
                    print_json(&serde_json::json!({ "deleted": post_id }))
                }
            }
        }
        Command::Comment { action } => {
            let me = acting(client, &cli.acting_uid).await?;
            match action {
                CommentAction::Add { post_id, text } => {
                    print_json(&client.posts().add_comment(&me, &post_id, &text).await?)
                }
                CommentAction::Delete { comment_id } => {
                    client.posts().delete_comment(&me, &comment_id).await?;
                    print_json(&serde_json::json!({ "deleted": comment_id }))
                }
            }
        }
        Command::Chat { action } => {
            let me = acting(client, &cli.acting_uid).await?;
            let chat = client.messaging();
            match action {
                ChatAction::Send { uid, text } => print_json(&chat.send_direct(&me, &uid, &text).await?),
                ChatAction::History { uid } => print_json(&chat.direct_history(&me, &uid).await?),
                ChatAction::Watch { uid } => watch_chat(client, &me, &uid).await,
            }
        }
        Command::Group { action } => {
            let me = acting(client, &cli.acting_uid).await?;
            let chat = client.messaging();
            match action {
                GroupAction::Create { name } => print_json(&chat.create_group(&me, &name).await?),
                GroupAction::List => print_json(&chat.list_groups().await?),
                GroupAction::Send { group_id, text } => {
                    print_json(&chat.send_group(&me, &group_id, &text).await?)
                }
                GroupAction::History { group_id } => print_json(&chat.group_history(&group_id).await?),
            }
        }
    }
}

/// 订阅会话快照并把 stdin 的每一行作为消息发送，EOF 退出
async fn watch_chat(client: &SphereClient, me: &Principal, peer_uid: &str) -> Result<()> {
    let mut rx = client.messaging().subscribe_direct(me, peer_uid).await?;
    for msg in rx.borrow_and_update().iter() {
        println!("[{}] {}: {}", msg.send_time, msg.sender_name, msg.text);
    }

    let printer = tokio::spawn(async move {
        let mut shown = rx.borrow().len();
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            for msg in snapshot.iter().skip(shown) {
                println!("[{}] {}: {}", msg.send_time, msg.sender_name, msg.text);
            }
            shown = snapshot.len();
        }
    });

    info!("[CLI] 💬 进入与 {} 的会话，输入消息回车发送，Ctrl+D 退出", peer_uid);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("读取输入失败")? {
        if line.trim().is_empty() {
            continue;
        }
        if let Err(e) = client.messaging().send_direct(me, peer_uid, &line).await {
            warn!("[CLI] 发送失败: {:#}", e);
        }
    }
    printer.abort();
    info!("[CLI] 👋 会话结束");
    Ok(())
}

fn client_config(cli: &Cli) -> ClientConfig {
    let mut config = ClientConfig::new(cli.db.clone());
    config.identity_base_url = cli.identity_url.clone();
    config.api_key = cli.api_key.clone();
    config.blob_root = cli.blob_root.clone();
    config.blob_base_url = cli.blob_base_url.clone();
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(&cli.log_level)?;

    let mut client = SphereClient::new(client_config(&cli)).await?;
    client.set_friend_listener(Arc::new(CliFriendListener));

    run(&client, cli).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_flags_reach_client_config() {
        let cli = Cli::try_parse_from([
            "sphere-cli",
            "--blob-root",
            "/tmp/blobs",
            "--blob-base-url",
            "https://cdn.example",
            "feed",
        ])
        .unwrap();
        let config = client_config(&cli);
        assert_eq!(config.blob_root, "/tmp/blobs");
        assert_eq!(config.blob_base_url.as_deref(), Some("https://cdn.example"));

        let cli = Cli::try_parse_from(["sphere-cli", "feed"]).unwrap();
        assert_eq!(client_config(&cli).blob_base_url, None);
    }
}
