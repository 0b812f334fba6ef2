use std::io::{Cursor, Read};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use tftp::client::{self, RequestOptions};
use tftp::server::Server;
use tftp::tftp::Mode;

async fn spawn_server(root: PathBuf) -> SocketAddr {
	let bind_addr = SocketAddr::from((IpAddr::V4(Ipv4Addr::LOCALHOST), 0));
	let server = Server::bind(bind_addr, root).await.unwrap();
	let addr = server.local_addr().unwrap();
	tokio::spawn(async move {
		let _ = server.serve(tokio_util::sync::CancellationToken::new()).await;
	});
	addr
}

fn no_options() -> RequestOptions {
	RequestOptions::default()
}

/// spec.md §8 scenario 1: plain GET of a short file with no options.
#[tokio::test]
async fn scenario_basic_get() {
	let root = tempfile::tempdir().unwrap();
	std::fs::write(root.path().join("hello.txt"), b"hi\n").unwrap();
	let addr = spawn_server(root.path().to_path_buf()).await;

	let out = root.path().join("out.txt");
	client::get(addr, "hello.txt", &out, Mode::Octet, no_options()).await.unwrap();

	let mut contents = Vec::new();
	std::fs::File::open(&out).unwrap().read_to_end(&mut contents).unwrap();
	assert_eq!(contents, b"hi\n");
}

/// spec.md §8 scenario 2: GET with a negotiated blksize, spanning several
/// DATA packets including a short terminal block.
#[tokio::test]
async fn scenario_get_with_blksize_option() {
	let root = tempfile::tempdir().unwrap();
	let payload: Vec<u8> = (0u8..20).collect();
	std::fs::write(root.path().join("data.bin"), &payload).unwrap();
	let addr = spawn_server(root.path().to_path_buf()).await;

	let out = root.path().join("out.bin");
	let opts = RequestOptions { blksize: Some(8), ..Default::default() };
	client::get(addr, "data.bin", &out, Mode::Octet, opts).await.unwrap();

	let mut contents = Vec::new();
	std::fs::File::open(&out).unwrap().read_to_end(&mut contents).unwrap();
	assert_eq!(contents, payload);
}

/// spec.md §8 scenario 4: WRQ for a file that already exists is rejected
/// with ERROR(6) and doesn't disturb the existing file.
#[tokio::test]
async fn scenario_wrq_existing_file_rejected() {
	let root = tempfile::tempdir().unwrap();
	std::fs::write(root.path().join("taken.bin"), b"original").unwrap();
	let addr = spawn_server(root.path().to_path_buf()).await;

	let err = client::put(addr, Cursor::new(b"new content".to_vec()), "taken.bin", Mode::Octet, no_options())
		.await
		.unwrap_err();
	assert!(matches!(err, tftp::tftp::TransferError::PeerError { code: 6, .. }));

	let mut contents = Vec::new();
	std::fs::File::open(root.path().join("taken.bin")).unwrap().read_to_end(&mut contents).unwrap();
	assert_eq!(contents, b"original");
}

/// A client PUT reading from an arbitrary `Read` source (standing in for
/// standard input, per spec.md §6) round-trips byte for byte.
#[tokio::test]
async fn scenario_put_from_arbitrary_reader() {
	let root = tempfile::tempdir().unwrap();
	let addr = spawn_server(root.path().to_path_buf()).await;

	let payload = b"uploaded via a generic reader, not a file path".to_vec();
	client::put(addr, Cursor::new(payload.clone()), "uploaded.bin", Mode::Octet, no_options()).await.unwrap();

	let mut contents = Vec::new();
	std::fs::File::open(root.path().join("uploaded.bin")).unwrap().read_to_end(&mut contents).unwrap();
	assert_eq!(contents, payload);
}

/// A full GET/PUT round trip in netascii mode preserves Unix line endings,
/// even though the wire form uses CRLF in between.
#[tokio::test]
async fn scenario_netascii_round_trip() {
	let root = tempfile::tempdir().unwrap();
	let text = "line one\nline two\nline three\n";
	std::fs::write(root.path().join("text.txt"), text).unwrap();
	let addr = spawn_server(root.path().to_path_buf()).await;

	let downloaded = root.path().join("downloaded.txt");
	client::get(addr, "text.txt", &downloaded, Mode::NetAscii, no_options()).await.unwrap();

	let mut roundtrip = String::new();
	std::fs::File::open(&downloaded).unwrap().read_to_string(&mut roundtrip).unwrap();
	assert_eq!(roundtrip, text);

	client::put(addr, std::fs::File::open(&downloaded).unwrap(), "reuploaded.txt", Mode::NetAscii, no_options())
		.await
		.unwrap();
	let mut reuploaded = String::new();
	std::fs::File::open(root.path().join("reuploaded.txt")).unwrap().read_to_string(&mut reuploaded).unwrap();
	assert_eq!(reuploaded, text);
}

/// spec.md §8 block-wrap property: a transfer of exactly 65536 * blksize
/// bytes wraps the block counter through zero once and still completes.
#[tokio::test(flavor = "multi_thread")]
async fn block_counter_wraps_through_zero() {
	let root = tempfile::tempdir().unwrap();
	let blksize: usize = 8;
	let total = 65536 * blksize;
	let mut payload = vec![0u8; total];
	for (i, b) in payload.iter_mut().enumerate() {
		*b = (i % 256) as u8;
	}
	std::fs::write(root.path().join("big.bin"), &payload).unwrap();
	let addr = spawn_server(root.path().to_path_buf()).await;

	let out = root.path().join("big_out.bin");
	let opts = RequestOptions { blksize: Some(blksize as u16), ..Default::default() };
	let result = tokio::time::timeout(Duration::from_secs(60), client::get(addr, "big.bin", &out, Mode::Octet, opts)).await;
	result.expect("transfer timed out").unwrap();

	let mut contents = Vec::new();
	std::fs::File::open(&out).unwrap().read_to_end(&mut contents).unwrap();
	assert_eq!(contents.len(), total);
	assert_eq!(contents, payload);
}
