//! HTML views, compiled into the binary.

use minijinja::{context, Environment};
use palaver_core::Message;

use crate::error::AppError;

const LANDING_TEMPLATE: &str = "index.html";
const CHAT_TEMPLATE: &str = "chat.html";

pub struct Views {
    env: Environment<'static>,
}

impl Views {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template(LANDING_TEMPLATE, include_str!("../templates/index.html"))?;
        env.add_template(CHAT_TEMPLATE, include_str!("../templates/chat.html"))?;
        Ok(Self { env })
    }

    pub fn landing(&self, error: Option<&str>) -> Result<String, AppError> {
        let html = self
            .env
            .get_template(LANDING_TEMPLATE)?
            .render(context! { error => error })?;
        Ok(html)
    }

    pub fn chat(&self, username: &str, history: &[Message]) -> Result<String, AppError> {
        let html = self
            .env
            .get_template(CHAT_TEMPLATE)?
            .render(context! { username => username, chat_history => history })?;
        Ok(html)
    }
}
