/*!
# Aegis Telemetry - Couche d'acquisition des métriques

Fournit au tableau de bord SOC:
- Un moteur HTTP avec délais par catégorie et jeton porteur injecté
- Un décodeur tolérant qui récupère les payloads JSON endommagés
- La normalisation de plusieurs schémas backend vers un format unique
- Un basculement transparent live/simulé
- Un ordonnanceur de collecte et une sonde de disponibilité
*/

pub mod auth;
pub mod config;
pub mod credentials;
pub mod decoder;
pub mod error;
pub mod health;
pub mod metrics;
pub mod outcome;
pub mod request;
pub mod scheduler;
pub mod source;

pub use config::TelemetryConfig;
pub use credentials::{CredentialStore, KeyringVault, MemoryVault, TokenVault};
pub use decoder::{ContentKind, Decoder, DiagnosticFailure, ParsedValue};
pub use error::{ErrorKind, Result, TelemetryError};
pub use health::{ConnectionHealth, HealthProber, HealthTracker};
pub use metrics::{StandardizedMetrics, Simulator};
pub use outcome::{AcquisitionOutcome, DataSource, DegradedReason};
pub use request::{Call, Endpoint, RequestEngine, TimeoutPolicy, TimeoutTier};
pub use scheduler::{Delivery, PollingConfig, PollingScheduler, SchedulerState};
pub use source::{AcquisitionSource, SourceController, SourceMode};
