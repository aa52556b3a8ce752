use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api;
use crate::config;
use crate::data;
use crate::logging;
use crate::ui;

pub fn run() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    logging::init(&cfg.log);

    let config_path = config::default_path();
    let display_path = friendly_path(config_path.as_ref());

    let user_agent = if !cfg.api.user_agent.trim().is_empty() {
        cfg.api.user_agent.clone()
    } else {
        format!("feedr/{}", crate::VERSION)
    };

    let client = api::Client::new(api::ClientConfig {
        user_agent,
        base_url: Some(cfg.api.base_url.clone()),
        timeout: Some(cfg.api.timeout),
        http_client: None,
    })
    .context("initialize feed client")?;
    let client = Arc::new(client);

    let options = ui::Options {
        status_message: "Loading posts...".to_string(),
        feed_service: Arc::new(data::ApiFeedService::new(client.clone())),
        user_service: Arc::new(data::ApiUserService::new(client.clone())),
        post_service: Arc::new(data::ApiPostService::new(client.clone())),
        comment_service: Arc::new(data::ApiCommentService::new(client)),
        search_debounce: cfg.ui.search_debounce,
        theme: cfg.ui.theme.clone(),
        config_path: display_path,
    };

    let mut model = ui::Model::new(options);
    model.run()?;

    Ok(())
}

fn friendly_path(path: Option<&std::path::PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/feedr/config.yaml".to_string()
    }
}
