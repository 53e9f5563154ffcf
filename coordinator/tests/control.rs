use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use aggregator::Aggregator;
use comms::{
    ActorAddr,
    msg::{Command, Msg},
    specs::session::SessionStatus,
};
use coordinator::{Runtime, SessionConfig, server, source::InlineSource};
use machine_learning::{arch::Mlp, optimization::GradientDescent};
use tokio::{io, net::TcpListener};

fn runtime() -> Arc<Runtime> {
    let mut config = SessionConfig::default();
    config.training.epochs = 1;
    config.training.batch_size = NonZeroUsize::new(2).unwrap();
    config.training.hidden_layers = vec![2];
    config.training.rpc_timeout = Duration::from_millis(500);

    let rows = (0..10).map(|i| vec![i as f64 / 10.0]).collect();
    let labels = (0..10).map(|i| (i % 2) as f64).collect();
    let source = Arc::new(InlineSource::from_rows(rows, labels).unwrap());

    let (aggregator, _) =
        Aggregator::new(Mlp::zeros(vec![1, 2, 1]).unwrap(), GradientDescent::new(0.3)).spawn();

    Arc::new(Runtime::with_source(config, source, Arc::new(aggregator)).unwrap())
}

#[tokio::test]
async fn start_and_query_a_session() -> io::Result<()> {
    const SIZE: usize = 1024;

    let runtime = runtime();
    let (one, two) = io::duplex(SIZE);
    let (rx, tx) = io::split(one);
    let (mut rx, mut tx) = comms::channel(rx, tx);
    let (srx, stx) = io::split(two);
    let (srx, stx) = comms::channel(srx, stx);

    let server = {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move { server::serve_controller(&runtime, srx, stx).await })
    };

    let aggregator = ActorAddr::new("127.0.0.1:8091", "aggregator");
    tx.send(&Msg::Control(Command::StartTraining { aggregator }))
        .await?;

    let Msg::Control(Command::SessionStarted { id }) = rx.recv().await? else {
        panic!("expected the session id");
    };

    runtime.wait(id).await.unwrap();
    tx.send(&Msg::Control(Command::QueryStatus { id })).await?;

    let msg: Msg = rx.recv().await?;
    let Msg::Control(Command::Status { id: got, status }) = msg else {
        panic!("unexpected reply {msg:?}");
    };
    assert_eq!(got, id);
    assert!(matches!(status, SessionStatus::Completed { .. }));

    tx.send(&Msg::Control(Command::QueryStatus { id: 404 }))
        .await?;
    assert_eq!(
        rx.recv::<Msg>().await?,
        Msg::Control(Command::UnknownSession { id: 404 })
    );

    tx.send(&Msg::Control(Command::GetGlobalWeights)).await?;
    assert!(matches!(rx.recv::<Msg>().await?, Msg::Err(_)));

    tx.send(&Msg::Control(Command::Disconnect)).await?;
    server.await??;
    Ok(())
}

#[tokio::test]
async fn control_endpoint_over_tcp() -> io::Result<()> {
    let runtime = runtime();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(server::serve(listener, Arc::clone(&runtime)));

    let stream = tokio::net::TcpStream::connect(addr).await?;
    let (rx, tx) = stream.into_split();
    let (mut rx, mut tx) = comms::channel(rx, tx);

    let aggregator = ActorAddr::new("127.0.0.1:8091", "aggregator");
    tx.send(&Msg::Control(Command::StartEvaluation { aggregator }))
        .await?;

    let msg: Msg = rx.recv().await?;
    assert!(matches!(msg, Msg::Control(Command::SessionStarted { .. })));
    Ok(())
}
