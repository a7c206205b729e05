// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Diagnostic messages emitted by the native layer.
//!
//! One process-wide handler. With none installed, messages go to stderr the
//! way a toolkit's default handler would.

use std::fmt;

use parking_lot::{const_rwlock, RwLock};

/// Severity of a native message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Debug,
    Info,
    Warning,
    Critical,
    Fatal,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Debug => "debug",
            MessageKind::Info => "info",
            MessageKind::Warning => "warning",
            MessageKind::Critical => "critical",
            MessageKind::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Where a message was emitted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageContext {
    pub file: &'static str,
    pub line: u32,
    pub function: &'static str,
}

impl MessageContext {
    pub const fn new(file: &'static str, line: u32, function: &'static str) -> Self {
        Self { file, line, function }
    }
}

/// Builds a `MessageContext` for the call site.
#[macro_export]
macro_rules! message_context {
    () => {
        $crate::message::MessageContext::new(file!(), line!(), module_path!())
    };
}

pub type MessageHandler = fn(MessageKind, &MessageContext, &str);

static HANDLER: RwLock<Option<MessageHandler>> = const_rwlock(None);

/// Install `handler` (or restore the stderr default with `None`).
/// Returns the previously installed handler.
pub fn install_message_handler(handler: Option<MessageHandler>) -> Option<MessageHandler> {
    std::mem::replace(&mut *HANDLER.write(), handler)
}

/// Deliver a message to the installed handler.
pub fn emit(kind: MessageKind, context: &MessageContext, message: &str) {
    let handler = *HANDLER.read();
    match handler {
        Some(h) => h(kind, context, message),
        None => eprintln!("{}: {} ({}:{})", kind, message, context.file, context.line),
    }
}

pub fn warning(context: &MessageContext, message: &str) {
    emit(MessageKind::Warning, context, message);
}
