//! Loopback demo: an in-process link with an echo peer.
//!
//! The peer accepts every connect and echoes DATA frames back on the
//! same stream, so a single client can watch a full connect / write /
//! read / half-close lifecycle.
//!
//! Run with: `cargo run --example loopback`

use memwire::{packet_type, Link, ReadOutcome};

#[tokio::main]
async fn main() -> Result<(), memwire::LinkError> {
    let (link, peer, _service) = Link::start_in_memory();

    tokio::spawn(async move {
        loop {
            peer.wait().await;
            for (header, payload) in peer.recv() {
                match header.packet_type {
                    packet_type::CONNECT => {
                        println!("peer: connect to {:?}", String::from_utf8_lossy(&payload));
                        peer.send(packet_type::CONNECT_RESPONSE, header.stream_id, &[0]);
                    }
                    packet_type::DATA => {
                        peer.send(packet_type::DATA, header.stream_id, &payload);
                    }
                    packet_type::EOS => {
                        peer.send(packet_type::EOS, header.stream_id, &[]);
                    }
                    _ => {}
                }
            }
        }
    });

    let client = link.client();
    client.connect(1, "echo").await?;
    println!("client: connected");

    for message in ["hello", "shared-memory", "world"] {
        client.write(1, message).await?;
        match client.read(1, 64).await? {
            ReadOutcome::Data(data) => {
                println!("client: echoed {:?}", String::from_utf8_lossy(&data));
            }
            ReadOutcome::Eos => break,
        }
    }

    client.eos(1).await?;
    assert_eq!(client.read(1, 16).await?, ReadOutcome::Eos);
    println!("client: stream closed cleanly");
    Ok(())
}
