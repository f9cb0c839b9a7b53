use anyhow::{Context, Result};
use log::debug;
use rosc::{decoder, OscMessage, OscPacket, OscType};
use std::collections::HashMap;
use std::net::UdpSocket;

fn flatten(packet: OscPacket, out: &mut Vec<OscMessage>) {
    match packet {
        OscPacket::Message(msg) => out.push(msg),
        OscPacket::Bundle(bundle) => {
            for packet in bundle.content {
                flatten(packet, out);
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let port: u16 = match std::env::args().nth(1) {
        Some(arg) => arg.parse().with_context(|| format!("Invalid port {:?}", arg))?,
        None => 8888,
    };
    let addr = format!("0.0.0.0:{}", port);
    let socket = UdpSocket::bind(&addr)?;

    println!("Listening for OSC expression data on {}...", addr);

    let mut buf = [0u8; 65535]; // Max UDP size
    let mut last_values: HashMap<String, Vec<OscType>> = HashMap::new();
    let mut messages = Vec::new();

    loop {
        match socket.recv_from(&mut buf) {
            Ok((amt, src)) => {
                match decoder::decode_udp(&buf[..amt]) {
                    Ok((_, packet)) => flatten(packet, &mut messages),
                    Err(e) => {
                        eprintln!("Failed to decode OSC packet from {}: {:?}", src, e);
                        continue;
                    }
                }

                for msg in messages.drain(..) {
                    if last_values.get(&msg.addr) == Some(&msg.args) {
                        continue;
                    }
                    match msg.args.as_slice() {
                        [OscType::Float(value)] => println!("{} {:>10.4}", msg.addr, value),
                        args => println!("{} {:?}", msg.addr, args),
                    }
                    last_values.insert(msg.addr, msg.args);
                }
                debug!("{} distinct addresses seen", last_values.len());
            }
            Err(e) => {
                eprintln!("Error receiving data: {}", e);
            }
        }
    }
}
