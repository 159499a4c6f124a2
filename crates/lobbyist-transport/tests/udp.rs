//! Integration tests for the UDP transport.
//!
//! A plain `tokio::net::UdpSocket` plays the server so the tests can check
//! the exact datagrams the client puts on the wire.

#[cfg(feature = "udp")]
mod udp {
    use std::net::SocketAddr;
    use std::time::Duration;

    use lobbyist_protocol::ACKNOWLEDGEMENT_TAG;
    use lobbyist_transport::{
        Connection, TransportError, TransportEvent, UdpConfig, UdpConnection,
    };
    use tokio::net::UdpSocket;

    fn quick_config() -> UdpConfig {
        UdpConfig {
            connect_timeout: Duration::from_millis(500),
            keep_alive_interval: Duration::from_secs(60),
        }
    }

    async fn recv_from(server: &UdpSocket) -> (Vec<u8>, SocketAddr) {
        let mut buf = vec![0u8; 2048];
        let (len, from) =
            tokio::time::timeout(Duration::from_secs(2), server.recv_from(&mut buf))
                .await
                .expect("server should receive in time")
                .expect("recv_from should succeed");
        buf.truncate(len);
        (buf, from)
    }

    async fn next_event(
        events: &mut lobbyist_transport::EventStream,
    ) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("event should arrive in time")
            .expect("event stream should be open")
    }

    #[tokio::test]
    async fn test_hello_ack_and_message_flow() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let client_task = tokio::spawn(async move {
            let mut conn = UdpConnection::with_config(addr, quick_config());
            let events = conn.connect(b"handshake").await.expect("connect");
            (conn, events)
        });

        // --- Hello: [8][id BE][hazel version][body] ---
        let (hello, client_addr) = recv_from(&server).await;
        assert_eq!(hello[0], 8);
        assert_eq!(&hello[1..3], &[0, 0]);
        assert_eq!(hello[3], 1);
        assert_eq!(&hello[4..], b"handshake");

        server.send_to(&[10, 0, 0, 0xFF], client_addr).await.unwrap();
        let (conn, mut events) = client_task.await.unwrap();

        // --- Client send is wrapped as a reliable packet ---
        conn.send(&[0, 0, 12]).await.unwrap();
        let (packet, _) = recv_from(&server).await;
        assert_eq!(packet, vec![1, 0, 1, 0, 0, 12]);

        // --- Server reliable packet is acknowledged and split ---
        server
            .send_to(&[1, 0, 7, 0, 0, 12], client_addr)
            .await
            .unwrap();
        let (ack, _) = recv_from(&server).await;
        assert_eq!(ack, vec![10, 0, 7, 0xFF]);
        assert_eq!(next_event(&mut events).await, TransportEvent::Data(vec![12]));

        // --- Server acknowledgement surfaces as tag 255 ---
        server.send_to(&[10, 0, 1, 0xFF], client_addr).await.unwrap();
        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::Data(vec![ACKNOWLEDGEMENT_TAG])
        );

        // --- Disconnect ends the stream ---
        server.send_to(&[9], client_addr).await.unwrap();
        assert!(matches!(
            next_event(&mut events).await,
            TransportEvent::Disconnected { .. }
        ));

        conn.close().await.unwrap();
        let (bye, _) = recv_from(&server).await;
        assert_eq!(bye, vec![9]);
    }

    #[tokio::test]
    async fn test_connect_times_out_without_ack() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let mut conn = UdpConnection::with_config(
            addr,
            UdpConfig {
                connect_timeout: Duration::from_millis(50),
                ..quick_config()
            },
        );
        let err = conn.connect(b"hs").await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectFailed(_)));
    }
}
