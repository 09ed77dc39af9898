pub mod bot;
pub mod bridge;
pub mod chunker;
pub mod config;
pub mod limiter;
pub mod llm;
pub mod pipeline;
pub mod server;

/// Reply to a message in its chat, quoting the original.
#[macro_export]
macro_rules! reply_to {
    ($bot:expr, $msg:expr, $text:expr) => {
        $bot.send_message($msg.chat.id, $text).reply_to_message_id($msg.id)
    };
}
