use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use tracing::{debug, error, info, warn};

use crate::api::{state::AppState, types::ExecuteOrderQuery};
use crate::domain::ErrorFrame;
use crate::execution::accept_order;
use crate::services::{Outbound, PushHandle};
use crate::validation::order_from_params;

/// GET /api/orders/execute -- one order per connection.
///
/// The request is validated after the upgrade so that a rejection reaches the
/// client as a frame rather than an HTTP status.
pub async fn execute_order_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ExecuteOrderQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, params, state))
}

async fn reject(sender: &mut SplitSink<WebSocket, Message>, message: String) {
    match serde_json::to_string(&ErrorFrame::new(message)) {
        Ok(json) => {
            let _ = sender.send(Message::Text(json)).await;
        }
        Err(e) => error!("Failed to serialize error frame: {}", e),
    }
    let _ = sender.send(Message::Close(None)).await;
}

async fn handle_socket(socket: WebSocket, params: ExecuteOrderQuery, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let order = match order_from_params(
        params.token_in.as_deref(),
        params.token_out.as_deref(),
        params.amount_in.as_deref(),
        params.slippage.as_deref(),
    ) {
        Ok(order) => order,
        Err(e) => {
            warn!(error = %e, "Order request rejected");
            reject(&mut sender, e.to_string()).await;
            return;
        }
    };

    let (handle, mut rx) = PushHandle::channel();
    let order_id = match accept_order(
        state.store.as_ref(),
        &state.push,
        &state.queue,
        order,
        handle,
    )
    .await
    {
        Ok(order_id) => order_id,
        Err(e) => {
            error!(error = %e, "Failed to accept order");
            reject(&mut sender, e.client_message()).await;
            return;
        }
    };

    // Forward pushed frames to this WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Text(text) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Client frames carry no meaning; only watch for the close
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Close(_) => break,
                other => debug!("Ignoring client frame: {:?}", other),
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.push.unregister(order_id).await;
    info!(%order_id, "Order connection closed");
}
