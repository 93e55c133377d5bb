use linkhub_link::{Command, DatumType, Event, Link, Message, Mode, Status};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn binary_frame(tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![tag];
    frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

#[tokio::test]
async fn handshake_determinism_binary() {
    let (a, mut b) = tokio::io::duplex(4096);
    let accept = tokio::spawn(Link::accept(a));
    b.write_all(&[0xA4, b'F', b'L', b'E', b'X']).await.unwrap();
    let (_link, _events) = accept.await.unwrap().unwrap();
}

#[tokio::test]
async fn handshake_determinism_text() {
    let (a, mut b) = tokio::io::duplex(4096);
    let accept = tokio::spawn(Link::accept(a));
    b.write_all(&[0x00, b'F', b'L', b'E', b'X']).await.unwrap();
    let (_link, _events) = accept.await.unwrap().unwrap();
}

#[tokio::test]
async fn bad_header_fails_and_closes() {
    let (a, mut b) = tokio::io::duplex(4096);
    let accept = tokio::spawn(Link::accept(a));
    b.write_all(b"NOPE!").await.unwrap();
    let err = accept.await.unwrap().unwrap_err();
    assert!(matches!(err, linkhub_link::LinkError::BadHeader));
}

#[tokio::test]
async fn binary_message_round_trip() {
    let (a, b) = tokio::io::duplex(4096);
    let (link_a, _events_a) = Link::dial(a, Mode::Binary).await.unwrap();
    let (_link_b, mut events_b) = Link::accept(b).await.unwrap();

    let msg = Message {
        to: "bob".into(),
        from: "alice".into(),
        flags: vec![],
        date: 0,
        msg: "hi".into(),
    };
    link_a.send_message(&msg).await.unwrap();

    let ev = events_b.recv().await.unwrap();
    assert_eq!(ev, Event::Message(msg));
}

#[tokio::test]
async fn unknown_type_is_skipped_and_next_frame_is_intact() {
    let (a, mut b) = tokio::io::duplex(4096);
    let accept = tokio::spawn(Link::accept(a));
    b.write_all(&[0xA4, b'F', b'L', b'E', b'X']).await.unwrap();
    let (_link, mut events) = accept.await.unwrap().unwrap();

    // An injected frame with an undefined type tag and empty payload.
    b.write_all(&binary_frame(99, &[])).await.unwrap();

    let status = Status {
        status: 1,
        payload: "ok".into(),
    };
    let payload = rmp_serde::to_vec_named(&status).unwrap();
    b.write_all(&binary_frame(DatumType::Status.tag(), &payload))
        .await
        .unwrap();

    let dropped = events.recv().await.unwrap();
    assert!(matches!(dropped, Event::Text(_)));

    let intact = events.recv().await.unwrap();
    assert_eq!(intact, Event::Status(status));
}

#[tokio::test]
async fn bye_closes_link_with_exactly_one_disconnect() {
    let (a, mut b) = tokio::io::duplex(4096);
    let accept = tokio::spawn(Link::accept(a));
    b.write_all(&[0xA4, b'F', b'L', b'E', b'X']).await.unwrap();
    let (_link, mut events) = accept.await.unwrap().unwrap();

    let cmd = Command {
        cmd: Command::BYE.to_string(),
        payload: vec![],
    };
    let payload = rmp_serde::to_vec_named(&cmd).unwrap();
    b.write_all(&binary_frame(DatumType::Command.tag(), &payload))
        .await
        .unwrap();

    let first = events.recv().await.unwrap();
    assert_eq!(first, Event::Text("Disconnected: BYE".to_string()));
    let second = events.recv().await.unwrap();
    assert_eq!(second, Event::Disconnect);
    assert!(events.recv().await.is_none());
}

#[tokio::test]
async fn mode_switch_ordering_puts_exact_bytes_before_next_frame() {
    let (a, mut b) = tokio::io::duplex(4096);
    let (link, _events) = Link::dial(a, Mode::Text).await.unwrap();

    let mut header = [0u8; 5];
    b.read_exact(&mut header).await.unwrap();
    assert_eq!(header, [0x00, b'F', b'L', b'E', b'X']);

    link.set_send_mode(Mode::Binary).await.unwrap();

    let mut switch = [0u8; 6];
    b.read_exact(&mut switch).await.unwrap();
    assert_eq!(&switch, b"\x00MPCK\r");

    let msg = Message {
        to: "bob".into(),
        from: "alice".into(),
        flags: vec![],
        date: 0,
        msg: "hi".into(),
    };
    link.send_message(&msg).await.unwrap();

    let mut tag = [0u8; 1];
    b.read_exact(&mut tag).await.unwrap();
    assert_eq!(tag[0], DatumType::Message.tag());
}

#[tokio::test]
async fn text_mode_ping_reply_round_trip() {
    let (a, b) = tokio::io::duplex(4096);
    let (link_a, _events_a) = Link::dial(a, Mode::Text).await.unwrap();
    let (_link_b, mut events_b) = Link::accept(b).await.unwrap();

    let msg = Message {
        to: String::new(),
        from: String::new(),
        flags: vec![],
        date: 0,
        msg: "PONG :hub.example".into(),
    };
    link_a.send_message(&msg).await.unwrap();

    let ev = events_b.recv().await.unwrap();
    match ev {
        Event::Message(m) => assert_eq!(m.msg, "PONG :hub.example"),
        other => panic!("expected a text message, got {other:?}"),
    }
}

#[tokio::test]
async fn roster_is_not_representable_in_text_mode() {
    let (a, _b) = tokio::io::duplex(4096);
    let (link, _events) = Link::dial(a, Mode::Text).await.unwrap();
    let err = link.send_roster(&vec![]).await.unwrap_err();
    assert!(matches!(err, linkhub_link::LinkError::NotRepresentable));
}
