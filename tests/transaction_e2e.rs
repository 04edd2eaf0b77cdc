// End-to-end wire tests: a real server socket driven by the redis client

use cinnabar::server::{CinnabarServer, ServerConfig};
use redis::{RedisResult, Value};
use std::net::SocketAddr;

async fn start_server() -> SocketAddr {
    let config = ServerConfig::default().with_port(0);
    let server = CinnabarServer::bind(config).await.expect("bind server");
    let addr = server.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

async fn connect(addr: SocketAddr) -> RedisResult<redis::aio::Connection> {
    let client = redis::Client::open(format!("redis://{}", addr))?;
    client.get_async_connection().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_successful_transaction_on_the_wire() -> RedisResult<()> {
    let addr = start_server().await;
    let mut con = connect(addr).await?;

    let reply: String = redis::cmd("MULTI").query_async(&mut con).await?;
    assert_eq!(reply, "OK");

    let reply: String = redis::cmd("SET")
        .arg("a")
        .arg("1")
        .query_async(&mut con)
        .await?;
    assert_eq!(reply, "QUEUED");

    let reply: String = redis::cmd("INCR").arg("a").query_async(&mut con).await?;
    assert_eq!(reply, "QUEUED");

    let reply: Vec<Value> = redis::cmd("EXEC").query_async(&mut con).await?;
    assert_eq!(reply.len(), 2);
    assert_eq!(reply[0], Value::Okay);
    assert_eq!(reply[1], Value::Int(2));

    let value: String = redis::cmd("GET").arg("a").query_async(&mut con).await?;
    assert_eq!(value, "2");

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watch_cancels_after_concurrent_write() -> RedisResult<()> {
    let addr = start_server().await;
    let mut watcher = connect(addr).await?;
    let mut writer = connect(addr).await?;

    let reply: String = redis::cmd("WATCH").arg("a").query_async(&mut watcher).await?;
    assert_eq!(reply, "OK");

    let _: String = redis::cmd("SET")
        .arg("a")
        .arg("9")
        .query_async(&mut writer)
        .await?;

    let _: String = redis::cmd("MULTI").query_async(&mut watcher).await?;
    let _: String = redis::cmd("INCR").arg("a").query_async(&mut watcher).await?;

    let reply: Option<Vec<Value>> = redis::cmd("EXEC").query_async(&mut watcher).await?;
    assert!(reply.is_none());

    let value: String = redis::cmd("GET").arg("a").query_async(&mut writer).await?;
    assert_eq!(value, "9");

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queue_time_error_aborts_on_the_wire() -> RedisResult<()> {
    let addr = start_server().await;
    let mut con = connect(addr).await?;

    let _: String = redis::cmd("MULTI").query_async(&mut con).await?;

    let err = redis::cmd("NOSUCHCMD")
        .query_async::<_, String>(&mut con)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown command"));

    let _: String = redis::cmd("SET")
        .arg("a")
        .arg("1")
        .query_async(&mut con)
        .await?;

    let err = redis::cmd("EXEC")
        .query_async::<_, Vec<Value>>(&mut con)
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("EXECABORT"));

    let value: Option<String> = redis::cmd("GET").arg("a").query_async(&mut con).await?;
    assert!(value.is_none());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_discard_drops_the_batch() -> RedisResult<()> {
    let addr = start_server().await;
    let mut con = connect(addr).await?;

    let _: String = redis::cmd("MULTI").query_async(&mut con).await?;
    let _: String = redis::cmd("SET")
        .arg("a")
        .arg("1")
        .query_async(&mut con)
        .await?;

    let reply: String = redis::cmd("DISCARD").query_async(&mut con).await?;
    assert_eq!(reply, "OK");

    let err = redis::cmd("EXEC")
        .query_async::<_, Vec<Value>>(&mut con)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("without MULTI"));

    let value: Option<String> = redis::cmd("GET").arg("a").query_async(&mut con).await?;
    assert!(value.is_none());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_nested_multi_rejected_on_the_wire() -> RedisResult<()> {
    let addr = start_server().await;
    let mut con = connect(addr).await?;

    let _: String = redis::cmd("MULTI").query_async(&mut con).await?;

    let err = redis::cmd("MULTI")
        .query_async::<_, String>(&mut con)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("nested"));

    // Still inside the original transaction.
    let reply: String = redis::cmd("PING").query_async(&mut con).await?;
    assert_eq!(reply, "QUEUED");

    let reply: Vec<Value> = redis::cmd("EXEC").query_async(&mut con).await?;
    assert_eq!(reply.len(), 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unwatch_on_the_wire() -> RedisResult<()> {
    let addr = start_server().await;
    let mut watcher = connect(addr).await?;
    let mut writer = connect(addr).await?;

    let _: String = redis::cmd("WATCH").arg("a").query_async(&mut watcher).await?;
    let _: String = redis::cmd("SET")
        .arg("a")
        .arg("9")
        .query_async(&mut writer)
        .await?;
    let _: String = redis::cmd("UNWATCH").query_async(&mut watcher).await?;

    let _: String = redis::cmd("MULTI").query_async(&mut watcher).await?;
    let _: String = redis::cmd("SET")
        .arg("a")
        .arg("1")
        .query_async(&mut watcher)
        .await?;

    let reply: Vec<Value> = redis::cmd("EXEC").query_async(&mut watcher).await?;
    assert_eq!(reply, vec![Value::Okay]);

    let value: String = redis::cmd("GET").arg("a").query_async(&mut watcher).await?;
    assert_eq!(value, "1");

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_clients_serialize() -> RedisResult<()> {
    let addr = start_server().await;

    // Two clients incrementing the same counter through transactions;
    // every increment must land.
    let mut handles = Vec::new();
    for _ in 0..2 {
        let handle = tokio::spawn(async move {
            let mut con = connect(addr).await.unwrap();
            for _ in 0..25 {
                let _: String = redis::cmd("MULTI").query_async(&mut con).await.unwrap();
                let _: String = redis::cmd("INCR")
                    .arg("counter")
                    .query_async(&mut con)
                    .await
                    .unwrap();
                let _: Vec<Value> = redis::cmd("EXEC").query_async(&mut con).await.unwrap();
            }
        });
        handles.push(handle);
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let mut con = connect(addr).await?;
    let value: i64 = redis::cmd("GET").arg("counter").query_async(&mut con).await?;
    assert_eq!(value, 50);

    Ok(())
}
