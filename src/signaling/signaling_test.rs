use serde_json::json;

use super::*;

fn new_signaler(timeout: Duration) -> (Signaler, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Signaler::new(Arc::new(tx), timeout), rx)
}

#[test]
fn test_request_serialize() -> Result<()> {
    let message = Message::Request(Request {
        request: true,
        id: 7,
        method: RequestMethod::CreateProducer,
        target: RequestMethod::CreateProducer.target(),
        data: into_map(json!({ "id": 1, "kind": "audio", "paused": false })),
    });

    let value = serde_json::to_value(&message)?;
    assert_eq!(
        value,
        json!({
            "request": true,
            "id": 7,
            "method": "createProducer",
            "target": "peer",
            "data": { "id": 1, "kind": "audio", "paused": false },
        })
    );

    Ok(())
}

#[test]
fn test_request_method_target() {
    let tests = vec![
        (RequestMethod::QueryRoom, Target::Room, "queryRoom"),
        (RequestMethod::Join, Target::Room, "join"),
        (RequestMethod::CreateTransport, Target::Peer, "createTransport"),
        (RequestMethod::RestartTransport, Target::Peer, "restartTransport"),
        (RequestMethod::CreateProducer, Target::Peer, "createProducer"),
        (RequestMethod::EnableConsumer, Target::Peer, "enableConsumer"),
    ];

    for (method, target, name) in tests {
        assert_eq!(method.target(), target, "testCase: {name}");
        assert_eq!(method.to_string(), name);
        assert_eq!(serde_json::to_value(method).unwrap(), json!(name));
    }
}

#[test]
fn test_inbound_notification_deserialize() -> Result<()> {
    let raw = r#"{
        "notification": true,
        "method": "producerPaused",
        "target": "peer",
        "id": 12,
        "appData": { "source": "mic" }
    }"#;

    let message: Message = serde_json::from_str(raw)?;
    let notification = match message {
        Message::Notification(notification) => notification,
        other => panic!("unexpected message {other:?}"),
    };
    assert_eq!(notification.method, "producerPaused");
    assert_eq!(notification.data.get("id"), Some(&json!(12)));
    assert_eq!(
        notification.data_value(),
        json!({ "id": 12, "appData": { "source": "mic" } })
    );

    Ok(())
}

#[tokio::test]
async fn test_signaler_request_success() -> Result<()> {
    let (signaler, mut rx) = new_signaler(DEFAULT_REQUEST_TIMEOUT);
    let signaler = Arc::new(signaler);

    let s = Arc::clone(&signaler);
    let answer = tokio::spawn(async move {
        let request = match rx.recv().await {
            Some(Message::Request(request)) => request,
            other => panic!("unexpected message {other:?}"),
        };
        assert_eq!(request.method, RequestMethod::QueryRoom);
        assert_eq!(request.target, Target::Room);
        s.receive_response(Response::success(request.id, json!({ "ok": 1 })))
            .await;
        // A duplicate response is dropped.
        s.receive_response(Response::success(request.id, json!({ "ok": 2 })))
            .await;
    });

    let data = signaler
        .request(RequestMethod::QueryRoom, Value::Null)
        .await?;
    assert_eq!(data, json!({ "ok": 1 }));
    answer.await.unwrap();
    assert_eq!(signaler.pending_len().await, 0);

    Ok(())
}

#[tokio::test]
async fn test_signaler_request_error() -> Result<()> {
    let (signaler, mut rx) = new_signaler(DEFAULT_REQUEST_TIMEOUT);
    let signaler = Arc::new(signaler);

    let s = Arc::clone(&signaler);
    tokio::spawn(async move {
        if let Some(Message::Request(request)) = rx.recv().await {
            s.receive_response(Response::error(request.id, 500, "boom"))
                .await;
        }
    });

    let result = signaler.request(RequestMethod::Join, json!({})).await;
    assert_eq!(result, Err(Error::ErrRequestFailed("boom".to_owned())));

    Ok(())
}

#[tokio::test]
async fn test_signaler_request_timeout() -> Result<()> {
    let (signaler, _rx) = new_signaler(Duration::from_millis(20));

    let result = signaler
        .request(RequestMethod::CreateTransport, json!({ "id": 1 }))
        .await;
    assert_eq!(result, Err(Error::ErrRequestTimeout));
    assert!(result.unwrap_err().is_timeout());
    assert_eq!(signaler.pending_len().await, 0);

    Ok(())
}

#[tokio::test]
async fn test_signaler_close_rejects_pending() -> Result<()> {
    let (signaler, _rx) = new_signaler(DEFAULT_REQUEST_TIMEOUT);
    let signaler = Arc::new(signaler);

    let s = Arc::clone(&signaler);
    let request =
        tokio::spawn(async move { s.request(RequestMethod::Join, json!({})).await });

    while signaler.pending_len().await == 0 {
        tokio::task::yield_now().await;
    }
    signaler.close().await;

    assert_eq!(request.await.unwrap(), Err(Error::ErrRoomClosed));

    Ok(())
}

#[tokio::test]
async fn test_signaler_notify() -> Result<()> {
    let (signaler, mut rx) = new_signaler(DEFAULT_REQUEST_TIMEOUT);

    signaler
        .notify(NotifyMethod::PauseProducer, json!({ "id": 3, "appData": null }))
        .await?;

    let value = serde_json::to_value(rx.recv().await.unwrap())?;
    assert_eq!(
        value,
        json!({
            "notification": true,
            "method": "pauseProducer",
            "target": "peer",
            "id": 3,
            "appData": null,
        })
    );

    Ok(())
}

#[tokio::test]
async fn test_signaler_send_failure() -> Result<()> {
    let (signaler, rx) = new_signaler(DEFAULT_REQUEST_TIMEOUT);
    drop(rx);

    let result = signaler.request(RequestMethod::Join, json!({})).await;
    assert!(matches!(result, Err(Error::MpscSend(_))));
    assert_eq!(signaler.pending_len().await, 0);

    Ok(())
}
