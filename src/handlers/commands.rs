//! 命令处理
//!
//! 每个命令处理前先经过授权守卫；命令注册表静态声明，
//! /help 和分发都从同一张表取数据

use anyhow::Result;
use tracing::info;

use crate::clients::InlineButton;
use crate::handlers::guard::{self, AccessLevel, AuthDecision};
use crate::handlers::BotContext;

/// 命令注册表：命令名 → (描述, 是否仅限管理员)
static COMMANDS: phf::Map<&'static str, (&'static str, bool)> = phf::phf_map! {
    "start" => ("Start the bot", false),
    "help" => ("Detailed help", false),
    "settings" => ("Configure destinations", false),
    "info" => ("Chat info", false),
    "collectpolls" => ("Start poll collection", false),
    "model" => ("Model & queue status", false),
    "queue" => ("Queue status", false),
    "cancel" => ("Cancel task", false),
    "authorize" => ("Authorize a user", true),
    "revoke" => ("Revoke a user", true),
    "users" => ("List authorized users", true),
};

/// 分发一条命令
pub async fn handle_command(
    ctx: &BotContext,
    user_id: i64,
    chat_id: i64,
    thread_id: Option<i64>,
    name: &str,
    args: &[String],
) -> Result<()> {
    // 未注册的命令直接忽略
    let Some(&(_, sudo_only)) = COMMANDS.get(name) else {
        return Ok(());
    };

    let level = if sudo_only {
        AccessLevel::Sudo
    } else {
        AccessLevel::User
    };
    match guard::check(ctx.directory.as_ref(), user_id, level).await {
        AuthDecision::Authorized => {}
        AuthDecision::Denied => {
            ctx.transport
                .send_message(
                    chat_id,
                    &format!(
                        "🔒 *Access Denied*\n\nYou are not authorized to use {}.\nPlease contact an administrator for access.",
                        ctx.config.bot_name
                    ),
                    None,
                )
                .await?;
            return Ok(());
        }
        AuthDecision::SudoRequired => {
            ctx.transport
                .send_message(
                    chat_id,
                    "🔐 *Sudo Access Required*\n\nThis command requires administrator privileges.",
                    None,
                )
                .await?;
            return Ok(());
        }
    }

    info!("[用户 {}] 📋 命令 /{}", user_id, name);

    match name {
        "start" => cmd_start(ctx, user_id, chat_id).await,
        "help" => cmd_help(ctx, user_id, chat_id).await,
        "settings" => cmd_settings(ctx, user_id, chat_id).await,
        "info" => cmd_info(ctx, chat_id, thread_id).await,
        "collectpolls" => cmd_collectpolls(ctx, user_id, chat_id).await,
        "model" => cmd_model(ctx, chat_id).await,
        "queue" => cmd_queue(ctx, user_id, chat_id).await,
        "cancel" => cmd_cancel(ctx, user_id, chat_id).await,
        "authorize" => cmd_authorize(ctx, user_id, chat_id, args).await,
        "revoke" => cmd_revoke(ctx, chat_id, args).await,
        "users" => cmd_users(ctx, chat_id).await,
        _ => Ok(()),
    }
}

async fn cmd_start(ctx: &BotContext, user_id: i64, chat_id: i64) -> Result<()> {
    let settings = ctx.directory.get_user_settings(user_id).await;
    let is_sudo = ctx.directory.is_sudo(user_id).await;

    let mut welcome = format!("👋 *Welcome to {}!*\n\n", ctx.config.bot_name);
    welcome += "📚 *What I can do:*\n";
    welcome += "• 📄 Process PDF files\n";
    welcome += "• 🖼️ Analyze images\n";
    welcome += "• 📊 Import CSV files\n";
    welcome += "• 📮 Collect quiz polls\n";
    welcome += "• 🤖 Generate MCQs with AI\n";
    welcome += "• 📢 Post to channels/groups\n\n";

    welcome += "⚙️ *Your Settings:*\n";
    welcome += &format!("📢 Quiz Marker: `{}`\n", settings.quiz_marker);
    welcome += &format!("🔗 Tag: `{}`\n\n", settings.explanation_tag);

    welcome += "📋 *Commands:*\n";
    welcome += &command_list(false);

    if is_sudo {
        welcome += "\n🔐 *Admin:*\n";
        welcome += &command_list(true);
    }

    ctx.transport.send_message(chat_id, &welcome, None).await?;
    Ok(())
}

async fn cmd_help(ctx: &BotContext, user_id: i64, chat_id: i64) -> Result<()> {
    let mut help_text = format!("📚 *{} - Help*\n\n", ctx.config.bot_name);
    help_text += "🎯 *Generate from PDF/Images:*\n";
    help_text += "1️⃣ Send PDF/images\n";
    help_text += "2️⃣ Choose mode (Extraction/Generation)\n";
    help_text += "3️⃣ Get CSV\n";
    help_text += "4️⃣ Post quizzes\n\n";

    help_text += "📮 *Collect Polls:*\n";
    help_text += "1️⃣ /collectpolls\n";
    help_text += "2️⃣ Forward polls\n";
    help_text += "3️⃣ Export CSV or document\n\n";

    help_text += "📊 *Post from CSV:*\n";
    help_text += "1️⃣ Send CSV\n";
    help_text += "2️⃣ Select destination\n";
    help_text += "3️⃣ Auto-post\n\n";

    help_text += "📋 *Commands:*\n";
    help_text += &command_list(false);
    if ctx.directory.is_sudo(user_id).await {
        help_text += "\n🔐 *Admin:*\n";
        help_text += &command_list(true);
    }

    ctx.transport.send_message(chat_id, &help_text, None).await?;
    Ok(())
}

/// 从注册表生成命令列表文本（按命令名排序保证稳定输出）
fn command_list(sudo_only: bool) -> String {
    let mut entries: Vec<(&str, &str)> = COMMANDS
        .entries()
        .filter(|(_, (_, sudo))| *sudo == sudo_only)
        .map(|(name, (desc, _))| (*name, *desc))
        .collect();
    entries.sort();
    entries
        .iter()
        .map(|(name, desc)| format!("/{} - {}\n", name, desc))
        .collect()
}

async fn cmd_settings(ctx: &BotContext, user_id: i64, chat_id: i64) -> Result<()> {
    let settings = ctx.directory.get_user_settings(user_id).await;
    let destinations = ctx.directory.get_destinations(user_id).await;

    let keyboard = vec![
        vec![InlineButton::new("➕ Channel", "settings_add_channel")],
        vec![InlineButton::new("➕ Group", "settings_add_group")],
        vec![InlineButton::new("📺 Channels", "settings_manage_channels")],
        vec![InlineButton::new("👥 Groups", "settings_manage_groups")],
    ];

    ctx.transport
        .send_message(
            chat_id,
            &format!(
                "⚙️ *Settings*\n\n📢 Marker: `{}`\n🔗 Tag: `{}`\n\n📺 Channels: {}\n👥 Groups: {}",
                settings.quiz_marker,
                settings.explanation_tag,
                destinations.channels.len(),
                destinations.groups.len()
            ),
            Some(keyboard),
        )
        .await?;
    Ok(())
}

async fn cmd_info(ctx: &BotContext, chat_id: i64, thread_id: Option<i64>) -> Result<()> {
    let mut info_text = format!("📊 *Chat Info*\n\n🆔 ID: `{}`\n", chat_id);
    if let Some(thread_id) = thread_id {
        info_text += &format!("🧵 Topic ID: `{}`\n", thread_id);
    } else {
        info_text += "\n💡 Send /info in a topic to get its ID!\n";
    }
    ctx.transport.send_message(chat_id, &info_text, None).await?;
    Ok(())
}

async fn cmd_collectpolls(ctx: &BotContext, user_id: i64, chat_id: i64) -> Result<()> {
    if ctx.polls.is_collecting(user_id) {
        // 已在收集中：展示当前状态
        let count = ctx.polls.count(user_id);
        ctx.transport
            .send_message(
                chat_id,
                &format!(
                    "📮 *Poll Collection Active*\n\n📊 Collected: {} polls\n\n✅ Forward or send polls to collect\n🗑️ Forwarded polls auto-deleted\n\nUse buttons below to export or manage:",
                    count
                ),
                Some(collection_keyboard()),
            )
            .await?;
    } else {
        ctx.polls.start(user_id);
        let keyboard = vec![vec![InlineButton::new("❌ Stop Collection", "poll_stop")]];
        let message = ctx
            .transport
            .send_message(
                chat_id,
                "📮 *Poll Collection Started!*\n\n📊 Collected: 0 polls\n\n✅ Forward or send polls to me\n🗑️ Forwarded polls will be auto-deleted\n📈 Counter updates live\n\nClick buttons when done!",
                Some(keyboard),
            )
            .await?;
        ctx.polls.set_status_message(user_id, message.message_id);
    }
    Ok(())
}

/// 收集进行中的操作键盘
pub(crate) fn collection_keyboard() -> Vec<Vec<InlineButton>> {
    vec![
        vec![InlineButton::new("📊 Export CSV", "poll_export_csv")],
        vec![InlineButton::new("📄 Export Document", "poll_export_doc")],
        vec![InlineButton::new("🗑️ Clear & Restart", "poll_clear")],
        vec![InlineButton::new("❌ Stop Collection", "poll_stop")],
    ]
}

async fn cmd_model(ctx: &BotContext, chat_id: i64) -> Result<()> {
    ctx.transport
        .send_message(
            chat_id,
            &format!(
                "🤖 Model: `{}`\nWorkers: {}\nQueue: {}/{}",
                ctx.config.extraction_model_name,
                ctx.config.max_concurrent_pages,
                ctx.queue.len(),
                ctx.queue.capacity()
            ),
            None,
        )
        .await?;
    Ok(())
}

async fn cmd_queue(ctx: &BotContext, user_id: i64, chat_id: i64) -> Result<()> {
    let text = if ctx.queue.is_processing(user_id) {
        "⚙️ Processing...".to_string()
    } else {
        let position = ctx.queue.position_of(user_id);
        if position > 0 {
            format!("📋 Position: {}", position)
        } else {
            "❌ No tasks".to_string()
        }
    };
    ctx.transport.send_message(chat_id, &text, None).await?;
    Ok(())
}

async fn cmd_cancel(ctx: &BotContext, user_id: i64, chat_id: i64) -> Result<()> {
    ctx.queue.evict(user_id);
    ctx.sessions.clear(user_id);
    ctx.transport
        .send_message(chat_id, "✅ Cancelled!", None)
        .await?;
    Ok(())
}

async fn cmd_authorize(
    ctx: &BotContext,
    user_id: i64,
    chat_id: i64,
    args: &[String],
) -> Result<()> {
    let Some(target) = args.first().and_then(|a| a.parse::<i64>().ok()) else {
        ctx.transport
            .send_message(chat_id, "Usage: /authorize <user_id>", None)
            .await?;
        return Ok(());
    };
    ctx.directory.authorize_user(target, user_id).await;
    ctx.transport
        .send_message(chat_id, &format!("✅ User {} authorized!", target), None)
        .await?;
    Ok(())
}

async fn cmd_revoke(ctx: &BotContext, chat_id: i64, args: &[String]) -> Result<()> {
    let Some(target) = args.first().and_then(|a| a.parse::<i64>().ok()) else {
        ctx.transport
            .send_message(chat_id, "Usage: /revoke <user_id>", None)
            .await?;
        return Ok(());
    };
    if ctx.directory.is_sudo(target).await {
        ctx.transport
            .send_message(chat_id, "❌ Cannot revoke sudo!", None)
            .await?;
        return Ok(());
    }
    ctx.directory.revoke_user(target).await;
    ctx.transport
        .send_message(chat_id, &format!("✅ Revoked {}!", target), None)
        .await?;
    Ok(())
}

async fn cmd_users(ctx: &BotContext, chat_id: i64) -> Result<()> {
    let users = ctx.directory.list_users().await;
    if users.is_empty() {
        ctx.transport.send_message(chat_id, "No users.", None).await?;
        return Ok(());
    }
    let mut text = format!("👥 *Authorized ({}):*\n\n", users.len());
    for user in users {
        let badge = if user.is_sudo { "🔐" } else { "👤" };
        text += &format!("{} `{}`\n", badge, user.user_id);
    }
    ctx.transport.send_message(chat_id, &text, None).await?;
    Ok(())
}
