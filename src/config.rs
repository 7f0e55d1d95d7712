use std::{env, path::PathBuf, str::FromStr};

use anyhow::Result;
use concat_string::concat_string;
use config::{Config as config_config, File as config_file};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::{
    crawler,
    declare::{AlertMode, Instrument},
    logging,
};

const CONFIG_PATH: &str = "app.json";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct App {
    pub bot: Bot,
    pub quote: Quote,
    pub momentum: Momentum,
    pub instruments: Vec<Instrument>,
}

impl Default for App {
    fn default() -> Self {
        App {
            bot: Default::default(),
            quote: Default::default(),
            momentum: Default::default(),
            instruments: default_instruments(),
        }
    }
}

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
#[serde(default)]
pub struct Bot {
    pub telegram: Telegram,
}

const TELEGRAM_TOKEN: &str = "TELEGRAM_TOKEN";
const TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";
const TELEGRAM_DISABLE_NOTIFICATION: &str = "TELEGRAM_DISABLE_NOTIFICATION";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Telegram {
    pub token: String,
    pub chat_id: String,
    /// deliver alerts silently
    pub disable_notification: bool,
    pub api_base: String,
}

impl Default for Telegram {
    fn default() -> Self {
        Telegram {
            token: String::new(),
            chat_id: String::new(),
            disable_notification: false,
            api_base: "https://api.telegram.org".to_string(),
        }
    }
}

impl Telegram {
    /// Both the token and the target chat are needed to send anything.
    pub fn is_configured(&self) -> bool {
        !self.token.trim().is_empty() && !self.chat_id.trim().is_empty()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Quote {
    /// scheme and host of the quote pages
    pub base_url: String,
    /// sent instead of the client's random browser user agent
    pub user_agent: Option<String>,
}

impl Default for Quote {
    fn default() -> Self {
        Quote {
            base_url: concat_string!("https://", crawler::lstc::HOST),
            user_agent: Some("Mozilla/5.0".to_string()),
        }
    }
}

const MOMENTUM_THRESHOLD_PERCENT: &str = "MOMENTUM_THRESHOLD_PERCENT";
const MOMENTUM_MODE: &str = "MOMENTUM_MODE";
const MOMENTUM_DAILY_THROTTLE: &str = "MOMENTUM_DAILY_THROTTLE";
const MOMENTUM_STORE_PATH: &str = "MOMENTUM_STORE_PATH";
const MOMENTUM_THROTTLE_PATH: &str = "MOMENTUM_THROTTLE_PATH";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Momentum {
    /// absolute drift in percent that fires an alert
    pub threshold_percent: Decimal,
    pub mode: AlertMode,
    /// at most one alert per instrument and calendar day
    pub daily_throttle: bool,
    pub store_path: PathBuf,
    pub throttle_path: PathBuf,
}

impl Default for Momentum {
    fn default() -> Self {
        Momentum {
            threshold_percent: dec!(0.5),
            mode: AlertMode::Trailing,
            daily_throttle: false,
            store_path: PathBuf::from("last_prices.json"),
            throttle_path: PathBuf::from("last_alerts.json"),
        }
    }
}

fn default_instruments() -> Vec<Instrument> {
    vec![
        Instrument::new("A1E0HS", "Silber-ETC", "DE000A1E0HS6"),
        Instrument::new("A1E0HR", "Gold-ETC", "DE000A1E0HR8"),
        Instrument::new("338643", "Strategy", "US5949721099"),
        Instrument::new("918422", "NVIDIA", "US67066G1040"),
        Instrument::new("871460", "Oracle", "US68389X1054"),
        Instrument::new("A2QA4J", "Palantir", "US69608A1088"),
        Instrument::new("A0NC7B", "Visa", "US92826C8394"),
        Instrument::new("581005", "Deutsche Boerse", "DE0005810055"),
    ]
}

pub static SETTINGS: Lazy<App> = Lazy::new(App::new);

impl App {
    /// Reads `app.json` when present, then applies the environment. A broken
    /// file is logged and the defaults are used instead.
    pub fn new() -> Self {
        match App::get() {
            Ok(app) => app,
            Err(why) => {
                logging::error_file_async(format!(
                    "I can't read the config context because {:?}",
                    why
                ));
                App::default().override_with_env()
            }
        }
    }

    fn get() -> Result<Self> {
        let config_path = config_path();
        if config_path.exists() {
            let config: App = config_config::builder()
                .add_source(config_file::from(config_path))
                .build()?
                .try_deserialize()?;
            return Ok(config.override_with_env());
        }

        Ok(App::default().override_with_env())
    }

    /// 將來至於 env 的設定值覆蓋掉 json 上的設定值
    fn override_with_env(mut self) -> Self {
        if let Ok(token) = env::var(TELEGRAM_TOKEN) {
            self.bot.telegram.token = token;
        }

        if let Ok(chat_id) = env::var(TELEGRAM_CHAT_ID) {
            self.bot.telegram.chat_id = chat_id;
        }

        if let Ok(disable) = env::var(TELEGRAM_DISABLE_NOTIFICATION) {
            self.bot.telegram.disable_notification = parse_bool(&disable);
        }

        if let Ok(threshold) = env::var(MOMENTUM_THRESHOLD_PERCENT) {
            match Decimal::from_str(threshold.trim()) {
                Ok(t) if t > Decimal::ZERO => self.momentum.threshold_percent = t,
                _ => logging::error_file_async(format!(
                    "Ignoring {}={} because it is not a positive number",
                    MOMENTUM_THRESHOLD_PERCENT, threshold
                )),
            }
        }

        if let Ok(mode) = env::var(MOMENTUM_MODE) {
            match AlertMode::from_str(mode.trim()) {
                Ok(m) => self.momentum.mode = m,
                Err(why) => logging::error_file_async(format!(
                    "Ignoring {}={} because {:?}",
                    MOMENTUM_MODE, mode, why
                )),
            }
        }

        if let Ok(throttle) = env::var(MOMENTUM_DAILY_THROTTLE) {
            self.momentum.daily_throttle = parse_bool(&throttle);
        }

        if let Ok(path) = env::var(MOMENTUM_STORE_PATH) {
            self.momentum.store_path = PathBuf::from(path);
        }

        if let Ok(path) = env::var(MOMENTUM_THROTTLE_PATH) {
            self.momentum.throttle_path = PathBuf::from(path);
        }

        self
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// 回傳設定檔的路徑
fn config_path() -> PathBuf {
    PathBuf::from(CONFIG_PATH)
}
