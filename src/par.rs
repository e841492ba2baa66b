//! An unordered parallel map over independent translation tasks: the one
//! concurrency primitive in the translator, used by the bulk-examples mode.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{mpsc, Mutex};
use std::thread;

/// Transform map values in parallel over `workers` threads. If `workers` is
/// less than one, uses the available parallelism (at least two).
///
/// Each worker reads entries off a bounded channel and stores successes in a
/// shared map. A worker that hits an error records it and exits its loop; the
/// rest keep draining. If any worker errored the whole result is discarded
/// and the aggregated error across workers is returned.
pub fn par_transform_map<K, T, U, F>(
    inputs: HashMap<K, T>,
    transform: F,
    workers: i64,
) -> Result<HashMap<K, U>>
where
    K: Eq + Hash + Clone + Send,
    T: Send,
    U: Send,
    F: Fn(&K, T) -> Result<U> + Sync,
{
    let n = if workers < 1 {
        thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(2)
            .max(2)
    } else {
        workers as usize
    };

    let (tx, rx) = mpsc::sync_channel::<(K, T)>(n);
    let rx = Mutex::new(rx);
    let results: Mutex<HashMap<K, U>> = Mutex::new(HashMap::new());
    let transform = &transform;

    let mut errors: Vec<anyhow::Error> = Vec::new();
    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(n);
        for _ in 0..n {
            let rx = &rx;
            let results = &results;
            handles.push(scope.spawn(move || -> Result<()> {
                loop {
                    // Take the receiver lock only long enough to pull one
                    // entry; the transform runs unlocked.
                    let entry = rx.lock().unwrap().recv();
                    let Ok((key, value)) = entry else {
                        return Ok(());
                    };
                    let result = transform(&key, value)?;
                    results.lock().unwrap().insert(key, result);
                }
            }));
        }

        for entry in inputs {
            // The receiver outlives the senders, so this cannot fail.
            let _ = tx.send(entry);
        }
        drop(tx);

        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => errors.push(err),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
    });

    if !errors.is_empty() {
        let combined = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        return Err(anyhow!(combined));
    }
    Ok(results.into_inner().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_map(n: i64) -> HashMap<i64, i64> {
        (0..n).map(|i| (i, 2 * i)).collect()
    }

    fn increment(_k: &i64, v: i64) -> Result<i64> {
        if v < 0 {
            return Err(anyhow!("neg"));
        }
        Ok(v + 1)
    }

    fn apply(inputs: &HashMap<i64, i64>) -> Result<HashMap<i64, i64>> {
        let mut out = HashMap::new();
        for (k, v) in inputs {
            out.insert(*k, increment(k, *v)?);
        }
        Ok(out)
    }

    #[test]
    fn transforms_all_entries() {
        let inputs = make_map(10);
        let expected = apply(&inputs).unwrap();

        for workers in [-1i64, 1, 2, 4] {
            let ops = AtomicUsize::new(0);
            let actual = par_transform_map(
                inputs.clone(),
                |k, v| {
                    ops.fetch_add(1, Ordering::SeqCst);
                    increment(k, v)
                },
                workers,
            )
            .unwrap();
            assert_eq!(actual, expected, "workers={workers}");
            assert_eq!(ops.load(Ordering::SeqCst), inputs.len(), "workers={workers}");
        }
    }

    #[test]
    fn single_failure_discards_the_batch() {
        let mut inputs = make_map(10);
        inputs.insert(4, -8);

        for workers in [-1i64, 2, 4] {
            let ops = AtomicUsize::new(0);
            let result = par_transform_map(
                inputs.clone(),
                |k, v| {
                    ops.fetch_add(1, Ordering::SeqCst);
                    increment(k, v)
                },
                workers,
            );
            let err = result.unwrap_err();
            assert!(err.to_string().contains("neg"), "workers={workers}");
            // Every input was still dispatched and attempted.
            assert_eq!(ops.load(Ordering::SeqCst), inputs.len(), "workers={workers}");
        }
    }

    #[test]
    fn empty_input_is_fine() {
        let out: HashMap<i64, i64> =
            par_transform_map(HashMap::new(), |k, v| increment(k, v), 2).unwrap();
        assert!(out.is_empty());
    }
}
