/* Hot path of the radio reader: decode one packet and fan it out to its rocket's
queues, plus the drop-oldest push on a saturated queue. Both run on the reader
thread between two radio receives. */
use criterion::{Criterion, criterion_group, criterion_main};
use ground_station::{
    publish::{
        queue::{OutboundMessage, output_queue},
        router::{ChannelFanout, ChannelKind, RocketChannelSet, RocketRouter},
    },
    receive::{
        decoder::decode,
        packet::{SignalMetrics, TelemetryPacket},
    },
    schema::{GroundPacket, Location},
    utils::metrics::StationMetrics,
};
use prost::Message;

use std::{collections::HashMap, hint::black_box, sync::Arc};

fn bench_decode_and_route(c: &mut Criterion) {
    let (tp, tc) = output_queue("t", 1024);
    let (lp, lc) = output_queue("l", 1024);
    let (sp, sc) = output_queue("s", 1024);
    let set = RocketChannelSet {
        telemetry: ChannelFanout::new(ChannelKind::Telemetry.topic_for("TOM"), vec![tp]),
        location: ChannelFanout::new(ChannelKind::Location.topic_for("TOM"), vec![lp]),
        signal: ChannelFanout::new(ChannelKind::Signal.topic_for("TOM"), vec![sp]),
    };
    let router = RocketRouter::new(
        HashMap::from([("TOM".to_string(), set)]),
        Arc::new(StationMetrics::default()),
    );

    let bytes = GroundPacket {
        rocket_id: "TOM".into(),
        location: Some(Location {
            latitude: 47.96,
            longitude: -81.87,
            altitude: 500.0,
        }),
        telemetry: vec![0u8; 96],
    }
    .encode_to_vec();
    let packet = TelemetryPacket::new(
        bytes,
        1,
        Some(SignalMetrics {
            rssi_dbm: -80.0,
            snr_db: 7.5,
        }),
    );

    c.bench_function("decode_and_route", |b| {
        b.iter(|| {
            let record = decode(black_box(&packet)).unwrap();
            black_box(router.route(&packet, &record));
            // Keep the queues from saturating so this measures the plain push path.
            let _ = (tc.try_pop(), lc.try_pop(), sc.try_pop());
        });
    });
}

fn bench_saturated_push(c: &mut Criterion) {
    let (producer, _consumer) = output_queue("full", 64);
    for i in 0..64 {
        producer.push(OutboundMessage::new(i, vec![0u8; 32]));
    }
    let msg = OutboundMessage::new(0, vec![0u8; 32]);

    c.bench_function("queue_push_drop_oldest", |b| {
        b.iter(|| black_box(producer.push(black_box(msg.clone()))));
    });
}

criterion_group!(benches, bench_decode_and_route, bench_saturated_push);
criterion_main!(benches);
