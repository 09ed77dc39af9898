mod command;
mod handlers;
mod send;

pub use command::Command;
pub use handlers::UpdateHandler;
pub use send::RetryingSender;

use teloxide::adaptors::throttle::Limits;
use teloxide::adaptors::{CacheMe, Throttle};
use teloxide::prelude::RequesterExt;

pub type Bot = CacheMe<Throttle<teloxide::Bot>>;

pub fn build_bot(token: &str) -> Bot {
    teloxide::Bot::new(token).throttle(Limits::default()).cache_me()
}
