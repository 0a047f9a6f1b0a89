/*!
# Aegis DevKit - Backend simulé et utilitaires de test

Bibliothèque facilitant les tests de la couche télémétrie avec:
- Un backend HTTP scriptable (wiremock) pour /health, /metrics et /login
- Des constructeurs de payloads (plats, imbriqués, tronqués, enveloppes d'erreur)
- Un harness qui câble la pile complète contre le backend simulé
*/

pub mod harness;
pub mod mock_backend;
pub mod payloads;

pub use harness::TestHarness;
pub use mock_backend::MockBackend;
pub use payloads::PayloadBuilder;
