//! Client and server connections talking to each other over real localhost sockets

use bytes::Bytes;
use rml_amf0::Amf0Value;
use rml_netconn::chunk_io::{ChunkFormat, OutboundHeader};
use rml_netconn::connection::{
    accept, connect, ConnectionConfig, ConnectionError, ConnectionHandlers, COMMAND_CHUNK_STREAM_ID,
};
use rml_netconn::messages::{Amf0Command, AMF0_COMMAND_TYPE_ID, AUDIO_TYPE_ID};
use rml_netconn::net::SystemNetwork;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn status(code: &str) -> Amf0Value {
    let mut properties = HashMap::new();
    properties.insert("level".to_string(), Amf0Value::Utf8String("status".to_string()));
    properties.insert("code".to_string(), Amf0Value::Utf8String(code.to_string()));
    Amf0Value::Object(properties)
}

#[test]
fn client_plays_stream_served_over_tcp() {
    let network = Rc::new(SystemNetwork::new());
    let address = network.listen("127.0.0.1:0").unwrap();
    let uri = format!("rtmp://127.0.0.1:{}/live/stream", address.port());

    let established = Rc::new(Cell::new(false));
    let established_flag = Rc::clone(&established);
    let client_handlers = ConnectionHandlers::new().on_established(move |_| established_flag.set(true));
    let client = connect(network.clone(), &uri, ConnectionConfig::new(), client_handlers).unwrap();

    let server_commands = Rc::new(RefCell::new(Vec::new()));
    let server_closes = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&server_commands);
    let closes = Rc::clone(&server_closes);
    let server_handlers = ConnectionHandlers::new()
        .on_command(move |connection, message| {
            seen.borrow_mut().push(message.command.name.clone());

            if message.command.is_named("connect") {
                let reply = Amf0Command::new(
                    "_result",
                    message.command.transaction_id,
                    Amf0Value::Null,
                    vec![status("NetConnection.Connect.Success")],
                );

                let payload = reply.serialize().unwrap();
                connection
                    .send_amf_command(ChunkFormat::Full, COMMAND_CHUNK_STREAM_ID, AMF0_COMMAND_TYPE_ID, 0, &payload)
                    .unwrap();
            } else if message.command.is_named("play") {
                connection
                    .send_command(message.stream_id, "onStatus", Amf0Value::Null, vec![status("NetStream.Play.Start")])
                    .unwrap();

                let header = OutboundHeader {
                    format: ChunkFormat::Full,
                    chunk_stream_id: 6,
                    timestamp: 33,
                    timestamp_delta: 0,
                    type_id: AUDIO_TYPE_ID,
                    message_stream_id: message.stream_id,
                };

                connection.send_message(&header, &[0xAF, 0x01, 0x02]).unwrap();
            }
        })
        .on_close(move |error| closes.borrow_mut().push(error));

    let server = accept(&*network, ConnectionConfig::new(), server_handlers).unwrap();

    assert!(network.poll_until(|| established.get(), TIMEOUT), "Client never connected");
    assert!(client.is_connected());

    let audio = Rc::new(RefCell::new(Vec::new()));
    let audio_sink = Rc::clone(&audio);
    let stream = client
        .play(
            "stream",
            1,
            move |timestamp: u32, data: Bytes| audio_sink.borrow_mut().push((timestamp, data.to_vec())),
            |_, _| (),
        )
        .unwrap();

    let statuses = Rc::new(RefCell::new(Vec::new()));
    let status_sink = Rc::clone(&statuses);
    stream.set_command_handler(move |command| {
        if let Some(code) = command.info_property("code") {
            status_sink.borrow_mut().push(code.to_string());
        }
    });

    assert!(network.poll_until(|| !audio.borrow().is_empty(), TIMEOUT), "Audio never arrived");
    assert_eq!(&audio.borrow()[..], &[(33, vec![0xAF, 0x01, 0x02])]);
    assert_eq!(&statuses.borrow()[..], &["NetStream.Play.Start".to_string()]);
    assert_eq!(&server_commands.borrow()[..], &["connect".to_string(), "play".to_string()]);

    client.close();
    assert!(network.poll_until(|| server.is_closed(), TIMEOUT), "Server never saw the close");

    let closes = server_closes.borrow();
    match &closes[..] {
        [Some(ConnectionError::TransportClosed)] => (),
        x => panic!("Unexpected server close errors: {:?}", x),
    }
}
