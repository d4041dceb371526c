use facematch_core::{DetectedFace, EncodeError, FaceEncoder};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("encoder error: {0}")]
    Encode(#[from] EncodeError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Encode {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Vec<DetectedFace>, EncodeError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Run the encoder over one image: detect every face and embed each one.
    pub async fn detect_and_encode(&self, image: Vec<u8>) -> Result<Vec<DetectedFace>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Encode {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        let faces = reply_rx.await.map_err(|_| EngineError::ChannelClosed)??;
        Ok(faces)
    }
}

/// Spawn the encoder on a dedicated OS thread.
///
/// Inference is blocking, so it never runs on the async runtime. Requests
/// are served one at a time in arrival order. The thread exits once every
/// handle has been dropped.
pub fn spawn_engine<E>(mut encoder: E) -> Result<EngineHandle, EngineError>
where
    E: FaceEncoder + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facematch-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Encode { image, reply } => {
                        let result = encoder.detect_and_encode(&image);
                        if let Err(e) = &result {
                            tracing::warn!(error = %e, bytes = image.len(), "encode failed");
                        }
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}
