mod common;

use aiofile::{AioError, AioFile, JoinSet, OpKind, Task};
use common::{ScriptedAio, Submitted, payload, runtime_with};

use std::fs::{self, OpenOptions};
use std::io::{SeekFrom, Write};
use std::rc::Rc;

#[test]
fn test_partial_writes_resubmit_remainder() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial");
    let data = payload(10_000);

    let aio = ScriptedAio::new();
    aio.max_write(4096);
    let mut rt = runtime_with(aio.clone());
    rt.block_on(async {
        let file = AioFile::open(&path, "w", 0)?;
        assert_eq!(file.write(&data, None).await?, data.len());
        assert_eq!(file.position(), 10_000);
        file.close().await
    })
    .unwrap();

    let shape: Vec<(u64, usize)> = aio
        .writes()
        .iter()
        .map(|(offset, bytes)| (*offset, bytes.len()))
        .collect();
    assert_eq!(shape, vec![(0, 10_000), (4096, 5904), (8192, 1808)]);
    assert_eq!(fs::read(&path).unwrap(), data);
}

#[test]
fn test_partial_write_leaves_tail_buffered() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial-buffered");

    let aio = ScriptedAio::new();
    aio.max_write(1000);
    let mut rt = runtime_with(aio.clone());
    rt.block_on(async {
        let file = AioFile::open(&path, "w", 4096)?;
        file.write(&payload(5000), None).await?;
        assert_eq!(aio.write_count(), 1);
        assert_eq!(file.pending_write_len(), 4000);
        assert_eq!(file.position(), 1000);
        file.close().await
    })
    .unwrap();

    assert_eq!(fs::read(&path).unwrap(), payload(5000));
}

#[test]
fn test_seek_end_then_write_appends() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seek-end");
    fs::write(&path, payload(100)).unwrap();

    let aio = ScriptedAio::new();
    let mut rt = runtime_with(aio.clone());
    rt.block_on(async {
        let file = AioFile::open(&path, "r+", 4096)?;
        file.read(10, None).await?;
        assert_eq!(file.seek(SeekFrom::End(0)).await?, 100);
        file.write(b"tail", None).await?;
        file.flush().await?;
        file.close().await
    })
    .unwrap();

    assert_eq!(aio.writes()[0].0, 100);
    let mut expected = payload(100);
    expected.extend_from_slice(b"tail");
    assert_eq!(fs::read(&path).unwrap(), expected);
}

#[test]
fn test_write_discards_stale_read_ahead() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stale");
    fs::write(&path, [b'.'; 100]).unwrap();

    let mut rt = runtime_with(ScriptedAio::new());
    rt.block_on(async {
        let file = AioFile::open(&path, "r+", 4096)?;
        assert_eq!(file.read(10, None).await?, Some(vec![b'.'; 10]));

        file.write(b"XY", Some(10)).await?;
        assert_eq!(file.read(2, Some(10)).await?.as_deref(), Some(&b"XY"[..]));
        file.close().await
    })
    .unwrap();
}

#[test]
fn test_seek_drains_pending_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seek-drain");

    let aio = ScriptedAio::new();
    let mut rt = runtime_with(aio.clone());
    rt.block_on(async {
        let file = AioFile::open(&path, "w+", 4096)?;
        file.write(&payload(50), None).await?;
        assert_eq!(aio.write_count(), 0);

        assert_eq!(file.seek(SeekFrom::Current(-20)).await?, 30);
        assert_eq!(aio.write_count(), 1);
        assert_eq!(file.pending_write_len(), 0);

        file.write(b"!", None).await?;
        file.close().await
    })
    .unwrap();

    let mut expected = payload(50);
    expected[30] = b'!';
    assert_eq!(fs::read(&path).unwrap(), expected);
}

#[test]
fn test_seek_whence_matches_seek_from() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("whence");
    fs::write(&path, payload(64)).unwrap();

    let mut rt = runtime_with(ScriptedAio::new());
    rt.block_on(async {
        let file = AioFile::open(&path, "r", 16)?;
        assert_eq!(file.seek_whence(10, libc::SEEK_SET).await?, 10);
        assert_eq!(file.seek_whence(5, libc::SEEK_CUR).await?, 15);
        assert_eq!(file.seek_whence(-4, libc::SEEK_END).await?, 60);
        assert_eq!(file.read(0, None).await?, Some(payload(64)[60..].to_vec()));
        file.close().await
    })
    .unwrap();
}

#[test]
fn test_append_ignores_offset_and_seek() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("append");
    fs::write(&path, b"hello").unwrap();

    let aio = ScriptedAio::new();
    let mut rt = runtime_with(aio.clone());
    rt.block_on(async {
        let file = AioFile::open(&path, "a", 4096)?;
        assert_eq!(file.position(), 5);

        file.write(b" world", Some(0)).await?;
        file.seek(SeekFrom::Start(0)).await?;
        assert_eq!(aio.write_count(), 0, "seek must not drain in append mode");
        assert_eq!(file.pending_write_len(), 6);

        file.close().await
    })
    .unwrap();

    assert_eq!(aio.writes(), vec![(5, b" world".to_vec())]);
    assert_eq!(fs::read(&path).unwrap(), b"hello world");
}

#[test]
fn test_append_read_leaves_writes_buffered() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("append-read");
    fs::write(&path, b"hello").unwrap();

    let aio = ScriptedAio::new();
    let mut rt = runtime_with(aio.clone());
    rt.block_on(async {
        let file = AioFile::open(&path, "a+", 4096)?;
        file.write(b"xyz", None).await?;

        assert_eq!(file.read(5, Some(0)).await?.as_deref(), Some(&b"hello"[..]));
        assert_eq!(aio.write_count(), 0);
        assert_eq!(file.pending_write_len(), 3);

        file.close().await
    })
    .unwrap();

    assert_eq!(aio.writes(), vec![(5, b"xyz".to_vec())]);
    assert_eq!(fs::read(&path).unwrap(), b"helloxyz");
}

#[test]
fn test_append_targets_current_end_of_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("append-grow");
    fs::write(&path, b"hello").unwrap();

    let aio = ScriptedAio::new();
    let mut rt = runtime_with(aio.clone());
    rt.block_on(async {
        let file = AioFile::open(&path, "a", 4096)?;
        file.write(b" world", None).await?;

        let mut other = OpenOptions::new().append(true).open(&path)?;
        other.write_all(b"!!!")?;

        file.close().await
    })
    .unwrap();

    assert_eq!(aio.writes()[0].0, 8);
    assert_eq!(fs::read(&path).unwrap(), b"hello!!! world");
}

#[test]
fn test_concurrent_writers_never_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("writers");

    let aio = ScriptedAio::new();
    aio.max_write(3);
    let mut rt = runtime_with(aio.clone());
    rt.block_on(async {
        let file = Rc::new(AioFile::open(&path, "w", 8)?);

        let mut set = JoinSet::new();
        for byte in [b'a', b'b'] {
            let file = file.clone();
            set.push(Task::spawn(async move {
                file.write(&[byte; 64], None).await
            }));
        }
        for written in set.await_all().await {
            assert_eq!(written?, 64);
        }
        file.close().await
    })
    .unwrap();

    let writes = aio.writes();
    for pair in writes.windows(2) {
        let (offset, bytes) = &pair[0];
        let confirmed = bytes.len().min(3) as u64;
        assert_eq!(pair[1].0, offset + confirmed, "submissions overlapped");
    }

    let content = fs::read(&path).unwrap();
    let a_first = [[b'a'; 64], [b'b'; 64]].concat();
    let b_first = [[b'b'; 64], [b'a'; 64]].concat();
    assert!(content == a_first || content == b_first);
}

#[test]
fn test_capability_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("caps");
    fs::write(&path, b"data").unwrap();

    let aio = ScriptedAio::new();
    let mut rt = runtime_with(aio.clone());
    rt.block_on(async {
        let reader = AioFile::open(&path, "r", 4096)?;
        assert!(reader.write(b"x", None).await.unwrap_err().is_usage());
        reader.close().await?;

        let writer = AioFile::open(&path, "w", 4096)?;
        assert!(writer.read(1, None).await.unwrap_err().is_usage());
        writer.close().await?;

        assert!(AioFile::open(&path, "rw", 4096).unwrap_err().is_usage());
        Ok::<_, AioError>(())
    })
    .unwrap();

    assert!(aio.log().is_empty());
}

#[test]
fn test_seek_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seek-errors");
    fs::write(&path, b"data").unwrap();

    let mut rt = runtime_with(ScriptedAio::new());
    rt.block_on(async {
        let file = AioFile::open(&path, "r", 4096)?;
        assert!(file.seek_whence(0, 7).await.unwrap_err().is_usage());
        assert!(file.seek(SeekFrom::Current(-1)).await.unwrap_err().is_usage());
        assert!(file.seek(SeekFrom::End(-5)).await.unwrap_err().is_usage());
        assert_eq!(file.position(), 0);
        file.close().await
    })
    .unwrap();
}

#[test]
fn test_rejected_seek_keeps_writes_buffered() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seek-reject");

    let aio = ScriptedAio::new();
    let mut rt = runtime_with(aio.clone());
    rt.block_on(async {
        let file = AioFile::open(&path, "w", 4096)?;
        file.write(b"abc", None).await?;

        assert!(file.seek(SeekFrom::Current(-100)).await.unwrap_err().is_usage());
        assert!(file.seek(SeekFrom::End(-100)).await.unwrap_err().is_usage());
        assert_eq!(aio.write_count(), 0);
        assert_eq!(file.pending_write_len(), 3);
        assert_eq!(file.position(), 0);

        // Relative to where the buffered bytes will end.
        assert_eq!(file.seek(SeekFrom::Current(-1)).await?, 2);
        assert_eq!(aio.write_count(), 1);
        file.close().await
    })
    .unwrap();

    assert_eq!(fs::read(&path).unwrap(), b"abc");
}

#[test]
fn test_concurrent_close_reports_usage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("double-close");

    let mut rt = runtime_with(ScriptedAio::new());
    let outcomes = rt
        .block_on(async {
            let file = Rc::new(AioFile::open(&path, "w", 4096)?);
            file.write(b"pending", None).await?;

            let mut set = JoinSet::new();
            for _ in 0..2 {
                let file = file.clone();
                set.push(Task::spawn(async move { file.close().await }));
            }
            Ok::<_, AioError>(set.await_all().await)
        })
        .unwrap();

    assert!(outcomes[0].is_ok());
    assert!(outcomes[1].as_ref().unwrap_err().is_usage());
    assert_eq!(fs::read(&path).unwrap(), b"pending");
}

#[test]
fn test_open_outside_runtime_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = AioFile::open(dir.path().join("nope"), "w", 4096).unwrap_err();
    assert!(err.is_usage());
}

#[test]
fn test_open_failure_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("file");

    let mut rt = runtime_with(ScriptedAio::new());
    let err = rt
        .block_on(async { AioFile::open(&path, "r", 4096).map(|_| ()) })
        .unwrap_err();
    assert!(matches!(err, AioError::Io(_)));
    assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
}

#[test]
fn test_submission_refusal_surfaces_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("refused");

    let aio = ScriptedAio::new();
    let mut rt = runtime_with(aio.clone());
    rt.block_on(async {
        let file = AioFile::open(&path, "w", 0)?;

        aio.reject(true);
        let err = file.write(b"abc", None).await.unwrap_err();
        assert!(matches!(err, AioError::Submission(_)));
        assert_eq!(err.raw_os_error(), Some(libc::EAGAIN));
        assert_eq!(file.position(), 0);

        aio.reject(false);
        file.write(b"abc", None).await?;
        file.close().await
    })
    .unwrap();

    assert_eq!(aio.log(), vec![Submitted::Write {
        offset: 0,
        data: b"abc".to_vec(),
    }]);
    assert_eq!(fs::read(&path).unwrap(), b"abc");
}

#[test]
fn test_completion_failure_carries_errno() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("failed");
    fs::write(&path, b"data").unwrap();

    let aio = ScriptedAio::new();
    aio.fail_with(libc::EIO);
    let mut rt = runtime_with(aio.clone());
    rt.block_on(async {
        let file = AioFile::open(&path, "r", 4096)?;
        match file.read(4, None).await {
            Err(AioError::Completion { op, errno }) => {
                assert_eq!(op, OpKind::Read);
                assert_eq!(errno, libc::EIO);
            }
            other => panic!("unexpected read outcome {other:?}"),
        }
        file.close().await
    })
    .unwrap();
}

#[test]
fn test_close_releases_descriptor_after_failed_flush() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("enospc");

    let aio = ScriptedAio::new();
    let mut rt = runtime_with(aio.clone());
    rt.block_on(async {
        let file = AioFile::open(&path, "w", 4096)?;
        file.write(b"lost", None).await?;

        aio.fail_with(libc::ENOSPC);
        let err = file.close().await.unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOSPC));
        assert!(file.is_closed());
        assert!(!file.keepalive_active());
        Ok::<_, AioError>(())
    })
    .unwrap();
}
