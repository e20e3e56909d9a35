use anyhow::Result;

use mcq_quiz_bot::config::Config;
use mcq_quiz_bot::orchestrator::App;
use mcq_quiz_bot::utils::logging;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env();

    // 初始化并运行应用
    App::initialize(config).await?.run().await?;

    Ok(())
}
