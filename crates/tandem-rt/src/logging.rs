// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Native diagnostics into `tracing`.

use tandem_native::message::{self, MessageContext, MessageHandler, MessageKind};
use tracing::Level;

pub fn level_for(kind: MessageKind) -> Level {
    match kind {
        MessageKind::Debug => Level::DEBUG,
        MessageKind::Info => Level::INFO,
        MessageKind::Warning => Level::WARN,
        MessageKind::Critical | MessageKind::Fatal => Level::ERROR,
    }
}

/// Log a native message at the level matching its kind.
pub fn native_message_handler(kind: MessageKind, context: &MessageContext, msg: &str) {
    let line = format!(
        "#NATIVE {}: {} ({}:{}, {})",
        kind, msg, context.file, context.line, context.function
    );
    // `tracing` levels must be constant at each call site.
    let level = level_for(kind);
    if level == Level::DEBUG {
        tracing::debug!("{}", line);
    } else if level == Level::INFO {
        tracing::info!("{}", line);
    } else if level == Level::WARN {
        tracing::warn!("{}", line);
    } else {
        tracing::error!("{}", line);
    }
}

/// Route native messages through `tracing`. Returns the previous handler.
pub fn install_default_message_handler() -> Option<MessageHandler> {
    message::install_message_handler(Some(native_message_handler))
}
