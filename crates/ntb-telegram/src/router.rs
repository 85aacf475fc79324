use std::sync::Arc;

use teloxide::{
    dispatching::Dispatcher,
    dptree,
    prelude::*,
    types::{CallbackQuery, Message},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ntb_core::{
    dispatch::EventDispatcher,
    domain::SubscriberId,
    messaging::{port::MessagingPort, types::Reply},
};

use crate::updates;

#[derive(Clone)]
pub struct BotState {
    pub dispatcher: Arc<EventDispatcher>,
    pub messenger: Arc<dyn MessagingPort>,
}

/// Long-poll Telegram until `shutdown` is cancelled.
pub async fn run_polling(
    bot: Bot,
    dispatcher: Arc<EventDispatcher>,
    messenger: Arc<dyn MessagingPort>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "bot started"),
        Err(e) => warn!(error = %e, "getMe failed; continuing"),
    }

    let state = Arc::new(BotState {
        dispatcher,
        messenger,
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handle_callback))
        .branch(Update::filter_message().endpoint(handle_message));

    let mut tg = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build();

    let token = tg.shutdown_token();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        match token.shutdown() {
            Ok(done) => done.await,
            Err(e) => debug!(error = %e, "dispatcher was idle at shutdown"),
        }
    });

    tg.dispatch().await;
    info!("polling stopped");
    Ok(())
}

async fn handle_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(update) = updates::from_message(&msg) else {
        debug!(chat = msg.chat.id.0, "ignoring unsupported message");
        return Ok(());
    };
    let to = update.sender().id.clone();
    let replies = state.dispatcher.handle_or_report(update).await;
    deliver(&state, &to, replies).await;
    Ok(())
}

async fn handle_callback(q: CallbackQuery, state: Arc<BotState>) -> ResponseResult<()> {
    // Always acknowledge so the client stops its spinner.
    if let Err(e) = state.messenger.answer_selection(&q.id, None).await {
        warn!(error = %e, "failed to answer callback query");
    }

    let Some(update) = updates::from_callback(&q) else {
        return Ok(());
    };
    let to = update.sender().id.clone();
    let replies = state.dispatcher.handle_or_report(update).await;
    deliver(&state, &to, replies).await;
    Ok(())
}

async fn deliver(state: &BotState, to: &SubscriberId, replies: Vec<Reply>) {
    for reply in replies {
        let sent = match reply.keyboard {
            Some(kb) => state.messenger.send_keyboard(to, &reply.text, kb).await,
            None => state.messenger.send_text(to, &reply.text, true).await,
        };
        if let Err(e) = sent {
            warn!(to = %to, error = %e, "failed to deliver reply");
        }
    }
}
