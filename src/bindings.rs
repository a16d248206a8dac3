//! Contract bindings used to build call data and read portal state.
use ethers::contract::abigen;

abigen!(
    Portal,
    r#"[
        function addFile(string metadataHash, string contentHash, string gateHash, uint8 fileType, uint256 version)
        function editFile(uint256 fileId, string metadataHash, string contentHash, string gateHash, uint8 fileType, uint256 version)
        function updateMetadata(string metadataHash)
        function getFileCount() external view returns (uint256)
        function files(uint256 index) external view returns (string, string, string, uint8, uint256)
        function owner() external view returns (address)
        function metadataIPFSHash() external view returns (string)
        function keyVerifiers(uint256 index) external view returns (bytes32, bytes32, bytes32, bytes32)
        event AddedFile(uint256 indexed fileId, string metadataHash, string contentHash, string gateHash, address indexed by)
        event EditedFile(uint256 indexed fileId, string metadataHash, string contentHash, string gateHash, address indexed by)
        event UpdatedPortalMetadata(string metadataHash, address indexed by)
    ]"#
);

abigen!(
    PortalRegistry,
    r#"[
        function mint(string metadataHash, string ownerViewDid, string ownerEditDid, bytes32 portalEncryptionKeyVerifier, bytes32 portalDecryptionKeyVerifier, bytes32 memberEncryptionKeyVerifier, bytes32 memberDecryptionKeyVerifier)
        event Mint(address indexed account, address indexed portal)
    ]"#
);

abigen!(
    SafeProxyFactory,
    r#"[
        function createProxyWithNonce(address singleton, bytes initializer, uint256 saltNonce) returns (address)
        function proxyCreationCode() external pure returns (bytes)
    ]"#
);

abigen!(
    SafeSingleton,
    r#"[
        function setup(address[] owners, uint256 threshold, address to, bytes data, address fallbackHandler, address paymentToken, uint256 payment, address paymentReceiver)
    ]"#
);

abigen!(
    SafeModuleSetup,
    r#"[
        function enableModules(address[] modules)
    ]"#
);

abigen!(
    Safe4337Module,
    r#"[
        function executeUserOpWithErrorString(address to, uint256 value, bytes data, uint8 operation)
    ]"#
);

abigen!(
    MultiSend,
    r#"[
        function multiSend(bytes transactions)
    ]"#
);
