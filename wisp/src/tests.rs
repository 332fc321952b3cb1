// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Protocol tests against a scripted peer on an in-memory pipe.

use std::sync::Arc;
use std::time::Duration;

use microdom::Element;
use sasl::common::Credentials;

use crate::client::{Client, ClientOptions};
use crate::connection::{Connection, Event, Status};
use crate::error::Error;
use crate::iq::{IqCallee, IqCaller};
use crate::reconnect::Reconnect;
use crate::sm::StreamManagement;
use crate::test_util::{pipe_connection, PipeTransport, OPEN_REPLY};

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

async fn wait_for_status(connection: &Connection, status: Status) {
    let mut rx = connection.status_watch();
    tokio::time::timeout(secs(5), async move {
        loop {
            if *rx.borrow_and_update() == status {
                return;
            }
            if rx.changed().await.is_err() {
                panic!("status channel closed while waiting for {}", status);
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("status {} not reached in time", status));
}

#[tokio::test(start_paused = true)]
async fn open_reaches_open_status_without_online() {
    let (connection, mut servers) = pipe_connection(1);
    let mut server = servers.remove(0);
    let server_task = tokio::spawn(async move {
        let open = server.recv_element().await;
        assert_eq!(open.name(), "open");
        assert_eq!(open.attr("to"), Some("capulet.lit"));
        assert_eq!(open.attr("version"), Some("1.0"));
        // Header-only reply: no stream features follow.
        server.send(OPEN_REPLY);
        server
    });

    connection.connect("pipe://capulet.lit").await.unwrap();
    assert_eq!(connection.status(), Status::Connect);
    let header = connection.open("capulet.lit", None).await.unwrap();
    assert_eq!(header.attr("from"), Some("capulet.lit"));
    assert_eq!(connection.status(), Status::Open);

    // Without features there is nothing to negotiate: the connection
    // must stay open, never online.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(connection.status(), Status::Open);
    let _server = server_task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn client_negotiates_sasl_bind_and_goes_online() {
    let (transport, mut servers) = PipeTransport::with_servers(1);
    let mut options = ClientOptions::new("pipe://capulet.lit");
    options.domain = Some("capulet.lit".to_owned());
    options.resource = Some("balcony".to_owned());
    options.credentials = Some(Credentials::default().with_username("u").with_password("p"));
    options.reconnect = false;
    let client = Client::with_transport(options, transport);

    let server_task = tokio::spawn(async move {
        let mut server = servers.remove(0);

        // Stream 1: offer SASL.
        server.recv_element().await;
        server.send(OPEN_REPLY);
        server.send(
            "<stream:features xmlns:stream=\"http://etherx.jabber.org/streams\">\
             <mechanisms xmlns=\"urn:ietf:params:xml:ns:xmpp-sasl\">\
             <mechanism>PLAIN</mechanism></mechanisms></stream:features>",
        );
        let auth = server.recv_element().await;
        assert!(auth.is("auth", "urn:ietf:params:xml:ns:xmpp-sasl"));
        assert_eq!(auth.attr("mechanism"), Some("PLAIN"));
        // base64 of "\0u\0p"
        assert_eq!(auth.text(), "AHUAcA==");
        server.send("<success xmlns=\"urn:ietf:params:xml:ns:xmpp-sasl\"/>");

        // The stream restarts after success.
        let reopen = server.recv_element().await;
        assert_eq!(reopen.name(), "open");
        server.send(OPEN_REPLY);
        server.send(
            "<stream:features xmlns:stream=\"http://etherx.jabber.org/streams\">\
             <bind xmlns=\"urn:ietf:params:xml:ns:xmpp-bind\"/></stream:features>",
        );

        // Stream 2: resource binding.
        let iq = server.recv_element().await;
        assert_eq!(iq.attr("type"), Some("set"));
        let bind = iq
            .get_child("bind", "urn:ietf:params:xml:ns:xmpp-bind")
            .expect("bind payload");
        assert_eq!(
            bind.get_child("resource", "urn:ietf:params:xml:ns:xmpp-bind")
                .expect("requested resource")
                .text(),
            "balcony"
        );
        let id = iq.attr("id").expect("bind request id").to_owned();
        server.send(&format!(
            "<iq xmlns=\"jabber:client\" type=\"result\" id=\"{}\">\
             <bind xmlns=\"urn:ietf:params:xml:ns:xmpp-bind\">\
             <jid>u@capulet.lit/balcony</jid></bind></iq>",
            id
        ));
        server
    });

    let jid = client.start().await.unwrap();
    assert_eq!(jid.to_string(), "u@capulet.lit/balcony");
    assert_eq!(client.connection().status(), Status::Online);
    assert_eq!(
        client.connection().jid().unwrap().to_string(),
        "u@capulet.lit/balcony"
    );
    assert!(client.connection().is_authenticated());
    let _server = server_task.await.unwrap();
}

fn ping_request(marker_ns: &str) -> Element {
    Element::new("iq")
        .with_attr("type", "get")
        .with_child(Element::new("ping").with_attr("xmlns", marker_ns))
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_resolve_independently_of_reply_order() {
    let (connection, mut servers) = pipe_connection(1);
    let caller = IqCaller::new(connection.clone());
    connection.use_inbound(Arc::new(caller.clone()));
    let mut server = servers.remove(0);

    let server_task = tokio::spawn(async move {
        server.recv_element().await;
        server.send(OPEN_REPLY);
        let first = server.recv_element().await;
        let second = server.recv_element().await;
        let reply = |iq: &Element| {
            let id = iq.attr("id").expect("request id");
            let marker = iq.children().next().expect("payload").attr("xmlns").unwrap();
            format!(
                "<iq xmlns=\"jabber:client\" type=\"result\" id=\"{}\"><done xmlns=\"{}\"/></iq>",
                id, marker
            )
        };
        // Answer in reverse arrival order.
        server.send(&reply(&second));
        server.send(&reply(&first));
        server
    });

    connection.connect("pipe://x").await.unwrap();
    connection.open("x", None).await.unwrap();
    let (one, two) = tokio::join!(
        caller.request(ping_request("urn:one"), secs(5)),
        caller.request(ping_request("urn:two"), secs(5))
    );
    assert!(one.unwrap().get_child("done", "urn:one").is_some());
    assert!(two.unwrap().get_child("done", "urn:two").is_some());
    assert_eq!(caller.pending(), 0);
    let _server = server_task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn unanswered_request_times_out_and_a_late_reply_is_ignored() {
    let (connection, mut servers) = pipe_connection(1);
    let caller = IqCaller::new(connection.clone());
    connection.use_inbound(Arc::new(caller.clone()));
    let mut server = servers.remove(0);

    let server_task = tokio::spawn(async move {
        server.recv_element().await;
        server.send(OPEN_REPLY);
        let iq = server.recv_element().await;
        let id = iq.attr("id").unwrap().to_owned();
        // Sit past the requester's timeout, then answer anyway.
        tokio::time::sleep(secs(2)).await;
        server.send(&format!(
            "<iq xmlns=\"jabber:client\" type=\"result\" id=\"{}\"><done xmlns=\"urn:late\"/></iq>",
            id
        ));
        server
    });

    connection.connect("pipe://x").await.unwrap();
    connection.open("x", None).await.unwrap();
    let events = connection.subscribe();
    let err = caller
        .request(ping_request("urn:late"), secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout));
    assert_eq!(caller.pending(), 0);

    // The duplicate reply falls through without disturbing anything.
    let mut events = events;
    tokio::time::timeout(secs(5), async {
        loop {
            if let Ok(Event::Element(el)) = events.recv().await {
                if el.get_child("done", "urn:late").is_some() {
                    return;
                }
            }
        }
    })
    .await
    .expect("late reply never surfaced");
    assert_eq!(caller.pending(), 0);
    let _server = server_task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn error_reply_rejects_with_stanza_error() {
    let (connection, mut servers) = pipe_connection(1);
    let caller = IqCaller::new(connection.clone());
    connection.use_inbound(Arc::new(caller.clone()));
    let mut server = servers.remove(0);

    let server_task = tokio::spawn(async move {
        server.recv_element().await;
        server.send(OPEN_REPLY);
        let iq = server.recv_element().await;
        server.send(&format!(
            "<iq xmlns=\"jabber:client\" type=\"error\" id=\"{}\">\
             <error type=\"cancel\">\
             <item-not-found xmlns=\"urn:ietf:params:xml:ns:xmpp-stanzas\"/>\
             </error></iq>",
            iq.attr("id").unwrap()
        ));
        server
    });

    connection.connect("pipe://x").await.unwrap();
    connection.open("x", None).await.unwrap();
    match caller.request(ping_request("urn:x"), secs(5)).await {
        Err(Error::Stanza(e)) => {
            assert_eq!(e.condition, "item-not-found");
            assert_eq!(e.error_type.as_deref(), Some("cancel"));
        }
        other => panic!("unexpected outcome: {:?}", other.map(|el| el.to_string())),
    }
    assert_eq!(caller.pending(), 0);
    let _server = server_task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn callee_answers_queries_with_exactly_one_reply() {
    let (connection, mut servers) = pipe_connection(1);
    let callee = IqCallee::new(connection.clone());
    connection.use_inbound(Arc::new(callee.clone()));
    let events = connection.subscribe();
    let mut server = servers.remove(0);

    callee.get("urn:example:ping", "ping", |_ctx, _child| async move {
        Ok(Some(
            Element::new("pong").with_attr("xmlns", "urn:example:ping"),
        ))
    });
    callee.set("urn:example:blob", "blob", |_ctx, _child| async move {
        Err(Error::InvalidState("handler blew up"))
    });
    callee.get("urn:example:null", "null", |_ctx, _child| async move { Ok(None) });

    let server_task = tokio::spawn(async move {
        server.recv_element().await;
        server.send(OPEN_REPLY);

        let condition_of = |reply: &Element| {
            reply
                .children()
                .find(|child| child.local_name() == "error")
                .expect("error payload")
                .children()
                .next()
                .expect("condition")
                .local_name()
                .to_owned()
        };

        // A valid query is answered from the handler.
        server.send(
            "<iq xmlns=\"jabber:client\" type=\"get\" id=\"q1\" \
             from=\"romeo@montague.lit/home\">\
             <ping xmlns=\"urn:example:ping\"/></iq>",
        );
        let reply = server.recv_element().await;
        assert_eq!(reply.attr("type"), Some("result"));
        assert_eq!(reply.attr("id"), Some("q1"));
        assert_eq!(reply.attr("to"), Some("romeo@montague.lit/home"));
        assert!(reply.get_child("pong", "urn:example:ping").is_some());

        // Two children: bad-request, no handler involved.
        server.send(
            "<iq xmlns=\"jabber:client\" type=\"get\" id=\"q2\">\
             <ping xmlns=\"urn:example:ping\"/><ping xmlns=\"urn:example:ping\"/></iq>",
        );
        let reply = server.recv_element().await;
        assert_eq!(reply.attr("type"), Some("error"));
        assert_eq!(condition_of(&reply), "bad-request");

        // Zero children as well.
        server.send("<iq xmlns=\"jabber:client\" type=\"set\" id=\"q3\"/>");
        let reply = server.recv_element().await;
        assert_eq!(condition_of(&reply), "bad-request");

        // A handler failure turns into internal-server-error.
        server.send(
            "<iq xmlns=\"jabber:client\" type=\"set\" id=\"q4\">\
             <blob xmlns=\"urn:example:blob\"/></iq>",
        );
        let reply = server.recv_element().await;
        assert_eq!(reply.attr("id"), Some("q4"));
        assert_eq!(condition_of(&reply), "internal-server-error");

        // A handler with nothing to say refuses politely.
        server.send(
            "<iq xmlns=\"jabber:client\" type=\"get\" id=\"q5\">\
             <null xmlns=\"urn:example:null\"/></iq>",
        );
        let reply = server.recv_element().await;
        assert_eq!(condition_of(&reply), "service-unavailable");

        // No handler registered at all.
        server.send(
            "<iq xmlns=\"jabber:client\" type=\"get\" id=\"q6\">\
             <other xmlns=\"urn:example:other\"/></iq>",
        );
        let reply = server.recv_element().await;
        assert_eq!(condition_of(&reply), "service-unavailable");

        server
    });

    connection.connect("pipe://x").await.unwrap();
    connection.open("x", None).await.unwrap();
    let _server = server_task.await.unwrap();

    // The failing handler also surfaced on the error event.
    let mut events = events;
    let mut saw_handler_error = false;
    while let Ok(event) = events.try_recv() {
        if let Event::Error(e) = event {
            saw_handler_error = e.to_string().contains("handler blew up");
            if saw_handler_error {
                break;
            }
        }
    }
    assert!(saw_handler_error);
}

#[tokio::test(start_paused = true)]
async fn sm_accounting_over_the_wire() {
    let (connection, mut servers) = pipe_connection(1);
    let sm = StreamManagement::new(connection.clone(), true, None);
    connection.use_inbound(Arc::new(sm.clone()));
    let mut server = servers.remove(0);

    let server_task = tokio::spawn(async move {
        server.recv_element().await;
        server.send(OPEN_REPLY);
        for _ in 0..3 {
            server.send("<message xmlns=\"jabber:client\"><body>hi</body></message>");
        }
        server.send("<r xmlns=\"urn:xmpp:sm:3\"/>");
        let ack = server.recv_element().await;
        assert!(ack.is("a", "urn:xmpp:sm:3"));
        assert_eq!(ack.attr("h"), Some("3"));
        server.send("<a xmlns=\"urn:xmpp:sm:3\" h=\"7\"/>");
        server
    });

    connection.connect("pipe://x").await.unwrap();
    connection.open("x", None).await.unwrap();
    let _server = server_task.await.unwrap();

    // The peer's <a/> *sets* the outbound counter.
    tokio::time::timeout(secs(5), async {
        loop {
            if sm.outbound() == 7 && sm.inbound() == 3 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("counters never caught up");
}

#[tokio::test(start_paused = true)]
async fn close_waits_for_the_peer_footer_and_blocks_sending() {
    let (connection, mut servers) = pipe_connection(1);
    let mut server = servers.remove(0);

    let open_task = tokio::spawn(async move {
        server.recv_element().await;
        server.send(OPEN_REPLY);
        server
    });
    connection.connect("pipe://x").await.unwrap();
    connection.open("x", None).await.unwrap();
    let mut server = open_task.await.unwrap();

    let closing = tokio::spawn({
        let connection = connection.clone();
        async move { connection.close(secs(2)).await }
    });

    let footer = server.recv_element().await;
    assert!(footer.is("close", "urn:ietf:params:xml:ns:xmpp-framing"));
    // While the close is in flight, sending is refused outright.
    wait_for_status(&connection, Status::Closing).await;
    match connection
        .send(Element::new("message").with_attr("xmlns", "jabber:client"))
        .await
    {
        Err(Error::Closing) => (),
        other => panic!("unexpected send outcome: {:?}", other.map(|_| ())),
    }

    server.send("<close xmlns=\"urn:ietf:params:xml:ns:xmpp-framing\"/>");
    let footer = closing.await.unwrap().unwrap();
    assert_eq!(footer.name(), "close");
    assert_eq!(connection.status(), Status::Close);
}

#[tokio::test(start_paused = true)]
async fn send_receive_returns_the_next_element() {
    let (connection, mut servers) = pipe_connection(1);
    let mut server = servers.remove(0);
    let server_task = tokio::spawn(async move {
        server.recv_element().await;
        server.send(OPEN_REPLY);
        let ping = server.recv_element().await;
        assert_eq!(ping.name(), "ping");
        server.send("<pong xmlns=\"jabber:client\"/>");
        server
    });

    connection.connect("pipe://x").await.unwrap();
    connection.open("x", None).await.unwrap();
    let pong = connection
        .send_receive(
            Element::new("ping").with_attr("xmlns", "jabber:client"),
            secs(2),
        )
        .await
        .unwrap();
    assert_eq!(pong.name(), "pong");
    let _server = server_task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stream_error_is_fatal() {
    let (connection, mut servers) = pipe_connection(1);
    let mut server = servers.remove(0);
    let mut events = connection.subscribe();

    let server_task = tokio::spawn(async move {
        server.recv_element().await;
        server.send(OPEN_REPLY);
        server.send(
            "<stream:error xmlns:stream=\"http://etherx.jabber.org/streams\">\
             <system-shutdown xmlns=\"urn:ietf:params:xml:ns:xmpp-streams\"/>\
             </stream:error>",
        );
        server.drain().await;
    });

    connection.connect("pipe://x").await.unwrap();
    connection.open("x", None).await.unwrap();

    tokio::time::timeout(secs(5), async {
        loop {
            if let Ok(Event::Error(e)) = events.recv().await {
                if let Error::Stream(stream_error) = &*e {
                    assert_eq!(stream_error.condition, "system-shutdown");
                    return;
                }
            }
        }
    })
    .await
    .expect("stream error never surfaced");
    wait_for_status(&connection, Status::Disconnect).await;
    server_task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn see_other_host_fails_over_to_the_new_host() {
    let (connection, mut servers) = pipe_connection(2);
    let second = servers.pop().unwrap();
    let first = servers.pop().unwrap();

    let first_task = tokio::spawn(async move {
        let mut server = first;
        server.recv_element().await;
        server.send(OPEN_REPLY);
        server.send(
            "<stream:error xmlns:stream=\"http://etherx.jabber.org/streams\">\
             <see-other-host xmlns=\"urn:ietf:params:xml:ns:xmpp-streams\">\
             other.example:5281</see-other-host></stream:error>",
        );
        // Wait for the client to drop its side, then go away.
        server.drain().await;
    });
    let second_task = tokio::spawn(async move {
        let mut server = second;
        let open = server.recv_element().await;
        // Domain and language survive the redirect.
        assert_eq!(open.attr("to"), Some("capulet.lit"));
        assert_eq!(open.attr("xml:lang"), Some("en"));
        server.send(OPEN_REPLY);
        server
    });

    connection.connect("pipe://old.example").await.unwrap();
    connection.open("capulet.lit", Some("en")).await.unwrap();

    first_task.await.unwrap();
    let _second = second_task.await.unwrap();
    wait_for_status(&connection, Status::Open).await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_retries_after_unexpected_disconnect() {
    let (connection, mut servers) = pipe_connection(2);
    let second = servers.pop().unwrap();
    let first = servers.pop().unwrap();

    let first_task = tokio::spawn(async move {
        let mut server = first;
        server.recv_element().await;
        server.send(OPEN_REPLY);
        server
    });
    connection.connect("pipe://capulet.lit").await.unwrap();
    connection.open("capulet.lit", None).await.unwrap();
    let mut first = first_task.await.unwrap();

    let supervisor = Reconnect::new(secs(1));
    supervisor.start(&connection);

    // The server goes away unexpectedly.
    first.close();
    wait_for_status(&connection, Status::Disconnect).await;

    let second_task = tokio::spawn(async move {
        let mut server = second;
        let open = server.recv_element().await;
        assert_eq!(open.attr("to"), Some("capulet.lit"));
        server.send(OPEN_REPLY);
        server
    });

    // One retry delay later the stream is open again.
    wait_for_status(&connection, Status::Open).await;
    supervisor.stop();
    let _second = second_task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn orderly_stop_does_not_trigger_a_reconnect() {
    let (connection, mut servers) = pipe_connection(2);
    let mut server = servers.remove(0);

    let server_task = tokio::spawn(async move {
        server.recv_element().await;
        server.send(OPEN_REPLY);
        // Answer the close, then hang up.
        let close = server.recv_element().await;
        assert_eq!(close.name(), "close");
        server.send("<close xmlns=\"urn:ietf:params:xml:ns:xmpp-framing\"/>");
        server.drain().await;
    });

    connection.connect("pipe://capulet.lit").await.unwrap();
    connection.open("capulet.lit", None).await.unwrap();

    let supervisor = Reconnect::new(secs(1));
    supervisor.start(&connection);

    connection.stop().await.unwrap();
    assert_eq!(connection.status(), Status::Offline);
    server_task.await.unwrap();

    // Give the supervisor ample time to (wrongly) fire: the status
    // re-check must keep it quiet, and the spare socket stays unused.
    tokio::time::sleep(secs(3)).await;
    assert_eq!(connection.status(), Status::Offline);
    assert_eq!(servers[0].try_recv(), None);
    supervisor.stop();
}
