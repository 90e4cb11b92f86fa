//! A minimal MQTT 3.1.1 broker stand-in for exercising the session over TCP.
//! Packets are encoded and decoded with the client library's own codec.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use rumqttc::mqttbytes::Error as CodecError;
use rumqttc::{
    ConnAck, Connect, ConnectReturnCode, Packet, PingResp, PubComp, PubRec, Publish, QoS, SubAck,
    SubscribeReasonCode,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_PACKET_SIZE: usize = 64 * 1024;

pub struct FakeBroker {
    listener: TcpListener,
}

impl FakeBroker {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self { listener }
    }

    pub fn addr(&self) -> SocketAddr {
        self.listener.local_addr().unwrap()
    }

    pub async fn accept(&self) -> BrokerConnection {
        let (stream, _) = timeout(STEP_TIMEOUT, self.listener.accept())
            .await
            .expect("client did not connect in time")
            .unwrap();
        BrokerConnection {
            stream,
            incoming: BytesMut::with_capacity(4096),
        }
    }
}

pub struct BrokerConnection {
    stream: TcpStream,
    incoming: BytesMut,
}

impl BrokerConnection {
    /// Reads the next packet, answering keep-alive pings on the way.
    pub async fn read_packet(&mut self) -> io::Result<Packet> {
        loop {
            match rumqttc::read(&mut self.incoming, MAX_PACKET_SIZE) {
                Ok(Packet::PingReq) => {
                    let mut pong = BytesMut::new();
                    PingResp.write(&mut pong).unwrap();
                    self.stream.write_all(&pong).await?;
                    continue;
                }
                Ok(packet) => return Ok(packet),
                Err(CodecError::InsufficientBytes(_)) => {}
                Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string())),
            }

            let read = timeout(STEP_TIMEOUT, self.stream.read_buf(&mut self.incoming))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no packet from client"))??;
            if read == 0 {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
        }
    }

    async fn send(&mut self, encode: impl FnOnce(&mut BytesMut) -> Result<usize, CodecError>) {
        let mut outgoing = BytesMut::new();
        encode(&mut outgoing).unwrap();
        self.stream.write_all(&outgoing).await.unwrap();
    }

    pub async fn expect_connect(&mut self) -> Connect {
        match self.read_packet().await.unwrap() {
            Packet::Connect(connect) => connect,
            other => panic!("expected CONNECT, got {:?}", other),
        }
    }

    pub async fn send_connack(&mut self) {
        let ack = ConnAck::new(ConnectReturnCode::Success, false);
        self.send(|buf| ack.write(buf)).await;
    }

    async fn answer_subscribe(&mut self, grant: bool) -> Vec<(String, QoS)> {
        let subscribe = match self.read_packet().await.unwrap() {
            Packet::Subscribe(subscribe) => subscribe,
            other => panic!("expected SUBSCRIBE, got {:?}", other),
        };

        let codes = subscribe
            .filters
            .iter()
            .map(|filter| {
                if grant {
                    SubscribeReasonCode::Success(filter.qos)
                } else {
                    SubscribeReasonCode::Failure
                }
            })
            .collect();
        let ack = SubAck::new(subscribe.pkid, codes);
        self.send(|buf| ack.write(buf)).await;

        subscribe
            .filters
            .into_iter()
            .map(|filter| (filter.path, filter.qos))
            .collect()
    }

    /// Waits for a SUBSCRIBE, grants it at the requested QoS and returns the filters.
    pub async fn accept_subscribe(&mut self) -> Vec<(String, QoS)> {
        self.answer_subscribe(true).await
    }

    /// Waits for a SUBSCRIBE and refuses every filter in it.
    pub async fn reject_subscribe(&mut self) -> Vec<(String, QoS)> {
        self.answer_subscribe(false).await
    }

    pub async fn expect_publish(&mut self) -> Publish {
        match self.read_packet().await.unwrap() {
            Packet::Publish(publish) => publish,
            other => panic!("expected PUBLISH, got {:?}", other),
        }
    }

    /// Receives a QoS 2 PUBLISH and completes the PUBREC/PUBREL/PUBCOMP exchange.
    pub async fn receive_exactly_once(&mut self) -> Publish {
        let publish = self.expect_publish().await;
        assert_eq!(publish.qos, QoS::ExactlyOnce, "publish must use exactly-once delivery");

        let rec = PubRec::new(publish.pkid);
        self.send(|buf| rec.write(buf)).await;

        match self.read_packet().await.unwrap() {
            Packet::PubRel(rel) => assert_eq!(rel.pkid, publish.pkid),
            other => panic!("expected PUBREL, got {:?}", other),
        }
        let comp = PubComp::new(publish.pkid);
        self.send(|buf| comp.write(buf)).await;

        publish
    }

    /// Sends an at-most-once PUBLISH to the client.
    pub async fn deliver(&mut self, topic: &str, payload: &[u8]) {
        let publish = Publish::new(topic, QoS::AtMostOnce, payload.to_vec());
        self.send(|buf| publish.write(buf)).await;
    }

    pub async fn expect_disconnect(&mut self) {
        match self.read_packet().await.unwrap() {
            Packet::Disconnect => {}
            other => panic!("expected DISCONNECT, got {:?}", other),
        }
    }
}
