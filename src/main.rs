pub mod bot;
pub mod calculation;
pub mod config;
pub mod crawler;
pub mod declare;
pub mod error;
pub mod event;
pub mod logging;
pub mod store;
pub mod util;

use scopeguard::defer;

#[cfg(all(target_os = "linux", target_env = "musl"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    defer! {
        logging::flush();
    }

    match event::trace::momentum::execute().await {
        Ok(report) => {
            logging::info_console(format!("momentum run done, {}", report));
            Ok(())
        }
        Err(why) => {
            logging::error_console(format!("momentum run failed because {:?}", why));
            Err(why)
        }
    }
}
