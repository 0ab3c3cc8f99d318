/*!
# WinHealth DevKit - Transport simulé et utilitaires de test

Bibliothèque facilitant les tests du collecteur sans hôte Windows:
- Transport simulé, scriptable hôte par hôte et sonde par sonde
- Réponses PowerShell canoniques (`ConvertTo-Json`) pour chaque sonde
- Harness de test avec réglages courts et assertions sur les rapports
*/

pub mod mock_transport;
pub mod responses;
pub mod test_utils;

pub use mock_transport::{MockCall, MockReply, MockTransport};
pub use responses::Responses;
pub use test_utils::TestHarness;
