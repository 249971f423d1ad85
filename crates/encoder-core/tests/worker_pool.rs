//! Worker pool integration: jobs in, frames out, clean teardown

use bytes::Bytes;
use tokio::sync::mpsc;

use licollect_encoder_core::{
    decode_export_frame, shared_ingress, DerEncoder, EncoderPool, EncodingJob, ForwardMessage,
    IriType, RecordPayload, RecordType,
};

fn pool_setup(
    lanes: usize,
    workers: usize,
) -> (
    Vec<mpsc::Sender<EncodingJob>>,
    mpsc::Receiver<ForwardMessage>,
    EncoderPool,
) {
    let mut lane_senders = Vec::new();
    let mut ingress = Vec::new();
    for _ in 0..lanes {
        let (tx, rx) = mpsc::channel(1024);
        lane_senders.push(tx);
        ingress.push(shared_ingress(rx));
    }

    let (fwd_tx, fwd_rx) = mpsc::channel(1024);

    let pool = EncoderPool::spawn(workers, ingress, vec![fwd_tx], "op".into(), || {
        Box::new(DerEncoder::new())
    });

    (lane_senders, fwd_rx, pool)
}

#[tokio::test]
async fn rawip_job_round_trips_through_the_pool() {
    let (lanes, mut fwd_rx, pool) = pool_setup(1, 1);

    let payload = Bytes::from_static(b"\x45\x00\x00\x1c raw ip packet bytes");
    let job = EncodingJob::new(RecordPayload::RawIp(payload.clone()), "LIID-42", "9")
        .with_seq_no(1)
        .with_dest_id(3);
    lanes[0].send(job).await.unwrap();

    let msg = fwd_rx.recv().await.expect("record forwarded");
    let result = match msg {
        ForwardMessage::Record(r) => r,
        other => panic!("unexpected message: {:?}", other),
    };

    assert_eq!(result.seq_no, 1);
    assert_eq!(result.dest_id, 3);
    assert!(result.is_der);

    // the export frame recovers LIID and IP payload bit-for-bit
    let mut frame = result.to_frame();
    let decoded = decode_export_frame(&mut frame).unwrap();
    assert_eq!(decoded.record_type, RecordType::RawIpSync);
    assert_eq!(decoded.liid, "LIID-42");
    assert_eq!(decoded.body, payload);

    pool.shutdown().await;
}

#[tokio::test]
async fn jobs_from_all_lanes_are_encoded() {
    let (lanes, mut fwd_rx, pool) = pool_setup(3, 2);

    for (i, lane) in lanes.iter().enumerate() {
        let job = EncodingJob::new(
            RecordPayload::IpMmIri {
                iri_type: IriType::Continue,
                contents: Bytes::from_static(b"SIP bytes"),
            },
            format!("LIID-{}", i),
            "1",
        )
        .with_seq_no(i as u32);
        lane.send(job).await.unwrap();
    }

    let mut liids = Vec::new();
    for _ in 0..3 {
        match fwd_rx.recv().await.expect("record forwarded") {
            ForwardMessage::Record(r) => {
                assert_eq!(r.record_type, RecordType::IpMmIri);
                assert!(r.encoded_by < 2);
                liids.push(r.liid);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
    liids.sort();
    assert_eq!(liids, vec!["LIID-0", "LIID-1", "LIID-2"]);

    pool.shutdown().await;
}

#[tokio::test]
async fn shutdown_sends_end_of_stream_per_worker() {
    let workers = 3;
    let (lanes, mut fwd_rx, pool) = pool_setup(1, workers);

    // park one job so at least one worker has encoded something
    lanes[0]
        .send(EncodingJob::new(
            RecordPayload::IpCc(Bytes::from_static(b"cc")),
            "L",
            "1",
        ))
        .await
        .unwrap();

    match fwd_rx.recv().await.expect("record forwarded") {
        ForwardMessage::Record(_) => {}
        other => panic!("unexpected message: {:?}", other),
    }

    let stats = pool.shutdown().await;
    assert_eq!(stats.len(), workers);
    assert_eq!(stats.iter().map(|s| s.jobs_encoded).sum::<u64>(), 1);

    let mut sentinels = 0;
    while let Some(msg) = fwd_rx.recv().await {
        match msg {
            ForwardMessage::EndOfStream => sentinels += 1,
            ForwardMessage::Record(r) => panic!("record after shutdown: {:?}", r),
        }
    }
    assert_eq!(sentinels, workers);
}

#[tokio::test]
async fn leftover_jobs_are_drained_on_shutdown() {
    let (lane_tx, lane_rx) = mpsc::channel(1024);
    let (fwd_tx, mut fwd_rx) = mpsc::channel(1024);

    // queue work before any worker exists, so every job is accounted for
    // either as encoded or as drained at teardown
    for _ in 0..5 {
        lane_tx
            .send(EncodingJob::new(
                RecordPayload::IpCc(Bytes::from_static(b"cc")),
                "L",
                "1",
            ))
            .await
            .unwrap();
    }

    let pool = EncoderPool::spawn(1, vec![shared_ingress(lane_rx)], vec![fwd_tx], "op".into(), || {
        Box::new(DerEncoder::new())
    });
    pool.stop();

    let stats = pool.shutdown().await;
    let drained: u64 = stats.iter().map(|s| s.drained_at_shutdown).sum();
    let encoded: u64 = stats.iter().map(|s| s.jobs_encoded).sum();
    assert_eq!(drained + encoded, 5);

    // only sentinels reach the forwarder after the drain
    let mut saw_end = false;
    while let Some(msg) = fwd_rx.recv().await {
        if matches!(msg, ForwardMessage::EndOfStream) {
            saw_end = true;
        }
    }
    assert!(saw_end);
}
