use std::{collections::HashSet, fmt};

use anyhow::Result;
use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use scopeguard::defer;

use crate::{
    bot::{telegram::Telegram, Notifier},
    calculation::momentum::{self, DailyAlertThrottle, Evaluation},
    config::{self, SETTINGS},
    crawler::{self, lstc::LangSchwarz, QuoteSource},
    declare::{AlertMode, Direction, Instrument},
    error::FetchError,
    logging,
    store::{Entries, JsonStore},
    util::text,
};

/// How a single instrument ended in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteOutcome {
    Initialized {
        price: Decimal,
    },
    Alerted {
        price: Decimal,
        drift: Decimal,
        direction: Direction,
    },
    Unchanged {
        price: Decimal,
        drift: Decimal,
    },
    Throttled {
        price: Decimal,
        drift: Decimal,
    },
}

/// 本次執行的統計
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub initialized: usize,
    pub alerted: usize,
    pub unchanged: usize,
    pub throttled: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn record(&mut self, outcome: &Result<QuoteOutcome, FetchError>) {
        match outcome {
            Ok(QuoteOutcome::Initialized { .. }) => self.initialized += 1,
            Ok(QuoteOutcome::Alerted { .. }) => self.alerted += 1,
            Ok(QuoteOutcome::Unchanged { .. }) => self.unchanged += 1,
            Ok(QuoteOutcome::Throttled { .. }) => self.throttled += 1,
            Err(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.initialized + self.alerted + self.unchanged + self.throttled + self.failed
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "initialized:{} alerted:{} unchanged:{} throttled:{} failed:{}",
            self.initialized, self.alerted, self.unchanged, self.throttled, self.failed
        )
    }
}

/// An alert on its way to the notifier.
#[derive(Debug, Clone, Copy)]
pub struct AlertEvent<'a> {
    pub instrument: &'a Instrument,
    pub new_price: Decimal,
    pub drift: Decimal,
    pub direction: Direction,
}

impl AlertEvent<'_> {
    pub fn to_message(&self) -> String {
        let sign = if self.drift.is_sign_negative() { "" } else { "+" };
        format!(
            "{emoji} <b>MOMENTUM ALARM</b>\n\nAktie: <b>{name}</b>\nNeuer Kurs: <b>{price:.2} EUR</b>\nÄnderung: <b>{sign}{drift:.2}%</b> seit letzter Meldung",
            emoji = self.direction.emoji(),
            name = text::escape_html(&self.instrument.display_name),
            price = self.new_price.round_dp(2),
            sign = sign,
            drift = self.drift.round_dp(2)
        )
    }
}

/// 依設定檔檢查所有商品的價格動能，必要時透過 Telegram 提醒
pub async fn execute() -> Result<BatchReport> {
    let source = LangSchwarz::new(&SETTINGS.quote);
    let notifier = Telegram::new(&SETTINGS.bot.telegram);

    run(&SETTINGS, &source, &notifier, Local::now().date_naive()).await
}

/// Runs one pass over `settings.instruments`.
///
/// A failing instrument is logged and counted, the others carry on. The
/// stores are written once at the end; failing to write them is the only
/// error this returns.
pub async fn run<S, N>(
    settings: &config::App,
    source: &S,
    notifier: &N,
    today: NaiveDate,
) -> Result<BatchReport>
where
    S: QuoteSource + ?Sized,
    N: Notifier + ?Sized,
{
    logging::info_file_async(format!(
        "開始檢查 {} 檔商品的價格動能 ({})",
        settings.instruments.len(),
        settings.momentum.mode
    ));
    defer! {
        logging::info_file_async("結束檢查價格動能");
    }

    let momentum = &settings.momentum;
    let reference_store = JsonStore::<Decimal>::new(momentum.store_path.clone());
    let throttle_store = momentum
        .daily_throttle
        .then(|| JsonStore::<NaiveDate>::new(momentum.throttle_path.clone()));

    let mut references = reference_store.load();
    logging::debug_file_async(format!(
        "{} references from {}",
        references.len(),
        reference_store.path().display()
    ));
    let mut throttle = throttle_store
        .as_ref()
        .map(|store| DailyAlertThrottle::new(store.load()));
    let mut report = BatchReport::default();

    for instrument in &settings.instruments {
        let outcome = process_instrument(
            instrument,
            source,
            notifier,
            momentum,
            &mut references,
            throttle.as_mut(),
            today,
        )
        .await;

        match &outcome {
            Ok(o) => logging::info_file_async(format!("{} {:?}", instrument, o)),
            Err(why) => logging::error_file_async(format!("{} skipped: {}", instrument, why)),
        }

        report.record(&outcome);
    }

    // instruments that left the configuration
    let configured: HashSet<&str> = settings
        .instruments
        .iter()
        .map(|instrument| instrument.short_code.as_str())
        .collect();
    references.retain(|short_code, _| configured.contains(short_code.as_str()));
    if let Some(throttle) = throttle.as_mut() {
        throttle.retain(|short_code| configured.contains(short_code));
    }

    let mut saved = reference_store.save(&references);
    if let (Some(store), Some(throttle)) = (&throttle_store, &throttle) {
        let throttle_saved = store.save(throttle.entries());
        saved = saved.and(throttle_saved);
    }

    if let Err(why) = &saved {
        logging::error_file_async(format!("Failed to persist the state because {:?}", why));
    }

    logging::info_file_async(report.to_string());

    saved.map(|_| report)
}

async fn process_instrument<S, N>(
    instrument: &Instrument,
    source: &S,
    notifier: &N,
    settings: &config::Momentum,
    references: &mut Entries<Decimal>,
    throttle: Option<&mut DailyAlertThrottle>,
    today: NaiveDate,
) -> Result<QuoteOutcome, FetchError>
where
    S: QuoteSource + ?Sized,
    N: Notifier + ?Sized,
{
    let quote = crawler::fetch_quote_with_fallback(source, instrument).await?;
    let price = quote.price;
    let reference = references.get(&instrument.short_code).copied();

    let mut evaluation = momentum::evaluate(
        &instrument.short_code,
        price,
        reference,
        settings.threshold_percent,
    )?;
    if let Some(throttle) = throttle {
        evaluation = throttle.admit(&instrument.short_code, today, evaluation);
    }

    match evaluation {
        Evaluation::Initialize => {
            references.insert(instrument.short_code.clone(), price);
            Ok(QuoteOutcome::Initialized { price })
        }
        Evaluation::NoOp { drift } => Ok(QuoteOutcome::Unchanged { price, drift }),
        Evaluation::Throttled { drift, .. } => Ok(QuoteOutcome::Throttled { price, drift }),
        Evaluation::Alert { drift, direction } => {
            let event = AlertEvent {
                instrument,
                new_price: price,
                drift,
                direction,
            };

            // the reference moves on even when the message was lost
            if let Err(why) = notifier.send(&event.to_message()).await {
                logging::error_file_async(format!(
                    "Failed to notify the alert of {} because {:?}",
                    instrument, why
                ));
            }

            if settings.mode == AlertMode::Trailing {
                references.insert(instrument.short_code.clone(), price);
            }

            Ok(QuoteOutcome::Alerted {
                price,
                drift,
                direction,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        env, fs,
        path::{Path, PathBuf},
        sync::Mutex,
    };

    use anyhow::anyhow;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::{declare::QuoteSnapshot, util::http::REQUEST_TIMEOUT};

    struct FakeSource(HashMap<&'static str, Decimal>);

    #[async_trait]
    impl QuoteSource for FakeSource {
        async fn get_stock_quotes(&self, identifier: &str) -> Result<QuoteSnapshot, FetchError> {
            self.0
                .get(identifier)
                .map(|price| QuoteSnapshot::new(*price))
                .ok_or_else(|| FetchError::not_found(identifier))
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        messages: Mutex<Vec<String>>,
        broken: bool,
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        async fn send(&self, message: &str) -> Result<()> {
            if self.broken {
                return Err(anyhow!("telegram is down"));
            }
            self.messages.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    impl FakeNotifier {
        fn sent(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    fn source(prices: &[(&'static str, Decimal)]) -> FakeSource {
        FakeSource(prices.iter().copied().collect())
    }

    fn test_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("ls_momentum_run_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn settings(dir: &Path, mode: AlertMode, daily_throttle: bool) -> config::App {
        config::App {
            momentum: config::Momentum {
                threshold_percent: dec!(0.5),
                mode,
                daily_throttle,
                store_path: dir.join("last_prices.json"),
                throttle_path: dir.join("last_alerts.json"),
            },
            instruments: vec![
                Instrument::new("918422", "NVIDIA", ""),
                Instrument::new("871460", "Oracle", ""),
            ],
            ..Default::default()
        }
    }

    fn references(settings: &config::App) -> Entries<Decimal> {
        JsonStore::<Decimal>::new(settings.momentum.store_path.clone()).load()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    #[tokio::test]
    async fn test_first_run_initializes_references() {
        let dir = test_dir("initialize");
        let settings = settings(&dir, AlertMode::Trailing, false);
        let notifier = FakeNotifier::default();

        let report = run(
            &settings,
            &source(&[("918422", dec!(172.48)), ("871460", dec!(140))]),
            &notifier,
            day(16),
        )
        .await
        .unwrap();

        assert_eq!(report.initialized, 2);
        assert_eq!(report.total(), 2);
        assert!(notifier.sent().is_empty());
        let stored = references(&settings);
        assert_eq!(stored.get("918422"), Some(&dec!(172.48)));
        assert_eq!(stored.get("871460"), Some(&dec!(140)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_trailing_alert_resets_reference() {
        let dir = test_dir("trailing");
        let settings = settings(&dir, AlertMode::Trailing, false);
        let notifier = FakeNotifier::default();

        run(&settings, &source(&[("918422", dec!(100))]), &notifier, day(16))
            .await
            .unwrap();
        let report = run(&settings, &source(&[("918422", dec!(101))]), &notifier, day(16))
            .await
            .unwrap();

        assert_eq!(report.alerted, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(references(&settings).get("918422"), Some(&dec!(101)));
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("🚀 <b>MOMENTUM ALARM</b>"));

        // 0.3% away from the new reference
        let report = run(&settings, &source(&[("918422", dec!(101.3))]), &notifier, day(16))
            .await
            .unwrap();
        assert_eq!(report.unchanged, 1);
        assert_eq!(references(&settings).get("918422"), Some(&dec!(101)));
        assert_eq!(notifier.sent().len(), 1);

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_fixed_mode_keeps_reference() {
        let dir = test_dir("fixed");
        let settings = settings(&dir, AlertMode::Fixed, false);
        let notifier = FakeNotifier::default();

        run(&settings, &source(&[("918422", dec!(100))]), &notifier, day(16))
            .await
            .unwrap();
        for _ in 0..2 {
            let report = run(&settings, &source(&[("918422", dec!(101))]), &notifier, day(16))
                .await
                .unwrap();
            assert_eq!(report.alerted, 1);
        }

        assert_eq!(notifier.sent().len(), 2);
        assert_eq!(references(&settings).get("918422"), Some(&dec!(100)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_failing_instrument_does_not_stop_the_run() {
        let dir = test_dir("isolated");
        let settings = settings(&dir, AlertMode::Trailing, false);
        let notifier = FakeNotifier::default();

        let report = run(&settings, &source(&[("871460", dec!(140))]), &notifier, day(16))
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.initialized, 1);
        let stored = references(&settings);
        assert!(!stored.contains_key("918422"));
        assert_eq!(stored.get("871460"), Some(&dec!(140)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_notifier_failure_still_updates_reference() {
        let dir = test_dir("notifier_down");
        let settings = settings(&dir, AlertMode::Trailing, false);
        let notifier = FakeNotifier {
            broken: true,
            ..Default::default()
        };

        run(&settings, &source(&[("918422", dec!(100))]), &notifier, day(16))
            .await
            .unwrap();
        let report = run(&settings, &source(&[("918422", dec!(98))]), &notifier, day(16))
            .await
            .unwrap();

        assert_eq!(report.alerted, 1);
        assert_eq!(references(&settings).get("918422"), Some(&dec!(98)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_daily_throttle() {
        let dir = test_dir("throttle");
        let settings = settings(&dir, AlertMode::Trailing, true);
        let notifier = FakeNotifier::default();

        run(&settings, &source(&[("918422", dec!(100))]), &notifier, day(16))
            .await
            .unwrap();
        run(&settings, &source(&[("918422", dec!(101))]), &notifier, day(16))
            .await
            .unwrap();

        let report = run(&settings, &source(&[("918422", dec!(103))]), &notifier, day(16))
            .await
            .unwrap();
        assert_eq!(report.throttled, 1);
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(references(&settings).get("918422"), Some(&dec!(101)));

        let report = run(&settings, &source(&[("918422", dec!(103))]), &notifier, day(17))
            .await
            .unwrap();
        assert_eq!(report.alerted, 1);
        assert_eq!(notifier.sent().len(), 2);
        assert_eq!(references(&settings).get("918422"), Some(&dec!(103)));

        let alerts = JsonStore::<NaiveDate>::new(settings.momentum.throttle_path.clone()).load();
        assert_eq!(alerts.get("918422"), Some(&day(17)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_unconfigured_instruments_are_dropped() {
        let dir = test_dir("unconfigured");
        let settings = settings(&dir, AlertMode::Trailing, true);
        fs::write(
            &settings.momentum.store_path,
            r#"{"918422": 100, "999999": 10}"#,
        )
        .unwrap();
        fs::write(
            &settings.momentum.throttle_path,
            r#"{"918422": "2026-10-15", "999999": "2026-10-15"}"#,
        )
        .unwrap();
        let notifier = FakeNotifier::default();

        run(&settings, &source(&[("918422", dec!(100))]), &notifier, day(16))
            .await
            .unwrap();

        let stored = references(&settings);
        assert_eq!(stored.get("918422"), Some(&dec!(100)));
        assert!(!stored.contains_key("999999"));
        let alerts = JsonStore::<NaiveDate>::new(settings.momentum.throttle_path.clone()).load();
        assert_eq!(alerts.get("918422"), Some(&day(15)));
        assert!(!alerts.contains_key("999999"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_timed_out_instrument_does_not_stop_the_run() {
        let dir = test_dir("timeout");
        let settings = settings(&dir, AlertMode::Trailing, false);
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/de/aktie/918422"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"<div class="price">172,48</div>"#)
                    .set_delay(REQUEST_TIMEOUT * 3),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/de/aktie/871460"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"<div class="price">140,25</div>"#),
            )
            .mount(&server)
            .await;
        let lstc = LangSchwarz::new(&config::Quote {
            base_url: server.uri(),
            user_agent: None,
        });
        let notifier = FakeNotifier::default();

        let report = run(&settings, &lstc, &notifier, day(16)).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.initialized, 1);
        let stored = references(&settings);
        assert!(!stored.contains_key("918422"));
        assert_eq!(stored.get("871460"), Some(&dec!(140.25)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_zero_reference_is_skipped() {
        let dir = test_dir("zero");
        let settings = settings(&dir, AlertMode::Trailing, false);
        fs::write(&settings.momentum.store_path, r#"{"918422": 0}"#).unwrap();
        let notifier = FakeNotifier::default();

        let report = run(&settings, &source(&[("918422", dec!(100))]), &notifier, day(16))
            .await
            .unwrap();

        assert_eq!(report.failed, 2);
        assert!(notifier.sent().is_empty());
        assert_eq!(references(&settings).get("918422"), Some(&dec!(0)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_save_failure_is_returned() {
        let dir = test_dir("unwritable");
        let mut settings = settings(&dir, AlertMode::Trailing, false);
        // a directory cannot be replaced by the state file
        settings.momentum.store_path = dir.clone();
        let notifier = FakeNotifier::default();

        let result = run(&settings, &source(&[("918422", dec!(100))]), &notifier, day(16)).await;

        assert!(result.is_err());
        assert!(!dir.with_extension("tmp").exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_alert_message() {
        let instrument = Instrument::new("123456", "Procter & Gamble", "");
        let up = AlertEvent {
            instrument: &instrument,
            new_price: dec!(172.5),
            drift: dec!(1.2345),
            direction: Direction::Up,
        };

        assert_eq!(
            up.to_message(),
            "🚀 <b>MOMENTUM ALARM</b>\n\nAktie: <b>Procter &amp; Gamble</b>\nNeuer Kurs: <b>172.50 EUR</b>\nÄnderung: <b>+1.23%</b> seit letzter Meldung"
        );

        let down = AlertEvent {
            drift: dec!(-1),
            direction: Direction::Down,
            ..up
        };
        assert!(down.to_message().starts_with("⚠️ <b>MOMENTUM ALARM</b>"));
        assert!(down.to_message().contains("<b>-1.00%</b>"));
    }

    #[test]
    fn test_batch_report_display() {
        let mut report = BatchReport::default();
        report.record(&Ok(QuoteOutcome::Initialized { price: dec!(1) }));
        report.record(&Err(FetchError::not_found("918422")));

        assert_eq!(
            report.to_string(),
            "initialized:1 alerted:0 unchanged:0 throttled:0 failed:1"
        );
    }
}
