use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::{Mutex, OwnedMutexGuard};

use ssb_core::messaging::throttled::{ThrottleConfig, ThrottledMessenger};
use ssb_core::{
    backend::BackendRegistry,
    config::Config,
    domain::ChatId,
    flow::AuthFlow,
    messaging::port::MessagingPort,
    ports::{AdminNotifier, MembershipGate, NoopNotifier},
    session::SessionStore,
};

use crate::gate::TelegramMembershipGate;
use crate::handlers;
use crate::notify::TelegramAdminNotifier;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub flow: Arc<AuthFlow>,
    pub messenger: Arc<dyn MessagingPort>,
    pub gate: Arc<dyn MembershipGate>,
    pub user_locks: Arc<UserLocks>,
}

/// Per-user serialization: events for the same user never mutate its
/// session concurrently; events for different users run in parallel.
#[derive(Default)]
pub struct UserLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub async fn lock_user(&self, user_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(user_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub async fn run_polling(cfg: Arc<Config>, registry: BackendRegistry) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    // Basic startup info.
    if let Ok(me) = bot.get_me().await {
        println!("ssb started: @{}", me.username());
    }
    println!(
        "Backends enabled: {}",
        cfg.enabled_backends
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    match &cfg.must_join_channel {
        Some(ch) => println!("Membership gate: @{ch}"),
        None => println!("Membership gate: open"),
    }

    // Wrap the raw Telegram messenger with a throttling decorator: keypad
    // edits are bursty and trip per-chat limits otherwise. A 429 RetryAfter
    // retry stays at the Telegram adapter layer.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let gate: Arc<dyn MembershipGate> = Arc::new(TelegramMembershipGate::new(
        bot.clone(),
        cfg.must_join_channel.clone(),
    ));

    let notifier: Arc<dyn AdminNotifier> = match cfg.admin_chat_id {
        Some(id) => Arc::new(TelegramAdminNotifier::new(messenger.clone(), ChatId(id))),
        None => Arc::new(NoopNotifier),
    };

    let store = Arc::new(SessionStore::new());
    let flow = Arc::new(AuthFlow::new(cfg.clone(), registry, store, notifier));

    let state = Arc::new(AppState {
        cfg,
        flow,
        messenger,
        gate,
        user_locks: Arc::new(UserLocks::default()),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
