/// Eye expression channels in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum EyeExpressions {
    // Gaze
    LeftEyeX = 0,
    LeftEyeY,
    RightEyeX,
    RightEyeY,

    // Lids
    LeftEyeLid,
    RightEyeLid,

    // Brows and extras
    BrowRaise,
    BrowAngry,
    EyeWiden,
    EyeSquint,
    EyeDilate,

    Max,
}

impl EyeExpressions {
    pub const ALL: [EyeExpressions; EyeExpressions::Max as usize] = [
        Self::LeftEyeX,
        Self::LeftEyeY,
        Self::RightEyeX,
        Self::RightEyeY,
        Self::LeftEyeLid,
        Self::RightEyeLid,
        Self::BrowRaise,
        Self::BrowAngry,
        Self::EyeWiden,
        Self::EyeSquint,
        Self::EyeDilate,
    ];

    /// Where each slot of the fused 6-channel eye vector is sent.
    pub const FUSED: [EyeExpressions; 6] = [
        Self::LeftEyeX,
        Self::LeftEyeY,
        Self::LeftEyeLid,
        Self::RightEyeX,
        Self::RightEyeY,
        Self::RightEyeLid,
    ];

    pub fn name(self) -> String {
        format!("{:?}", self)
    }

    pub fn address(self) -> String {
        format!("/{:?}", self)
    }

    /// The four gaze channels use a signed range, everything else is unit range.
    pub fn is_gaze(self) -> bool {
        matches!(
            self,
            Self::LeftEyeX | Self::LeftEyeY | Self::RightEyeX | Self::RightEyeY
        )
    }
}

impl TryFrom<usize> for EyeExpressions {
    type Error = ();

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::ALL.get(value).copied().ok_or(())
    }
}

/// ARKit-style face blendshapes in model output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum FaceExpressions {
    // Cheek
    CheekPuffLeft = 0,
    CheekPuffRight,
    CheekSuckLeft,
    CheekSuckRight,

    // Jaw
    JawOpen,
    JawForward,
    JawLeft,
    JawRight,

    // Nose
    NoseSneerLeft,
    NoseSneerRight,

    // Mouth
    MouthFunnel,
    MouthPucker,
    MouthLeft,
    MouthRight,
    MouthRollUpper,
    MouthRollLower,
    MouthShrugUpper,
    MouthShrugLower,
    MouthClose,
    MouthSmileLeft,
    MouthSmileRight,
    MouthFrownLeft,
    MouthFrownRight,
    MouthDimpleLeft,
    MouthDimpleRight,
    MouthUpperUpLeft,
    MouthUpperUpRight,
    MouthLowerDownLeft,
    MouthLowerDownRight,
    MouthPressLeft,
    MouthPressRight,
    MouthStretchLeft,
    MouthStretchRight,

    // Tongue
    TongueOut,
    TongueUp,
    TongueDown,
    TongueLeft,
    TongueRight,
    TongueRoll,
    TongueBendDown,
    TongueCurlUp,
    TongueSquish,
    TongueFlat,
    TongueTwistLeft,
    TongueTwistRight,

    Max,
}

impl FaceExpressions {
    pub const ALL: [FaceExpressions; FaceExpressions::Max as usize] = [
        Self::CheekPuffLeft,
        Self::CheekPuffRight,
        Self::CheekSuckLeft,
        Self::CheekSuckRight,
        Self::JawOpen,
        Self::JawForward,
        Self::JawLeft,
        Self::JawRight,
        Self::NoseSneerLeft,
        Self::NoseSneerRight,
        Self::MouthFunnel,
        Self::MouthPucker,
        Self::MouthLeft,
        Self::MouthRight,
        Self::MouthRollUpper,
        Self::MouthRollLower,
        Self::MouthShrugUpper,
        Self::MouthShrugLower,
        Self::MouthClose,
        Self::MouthSmileLeft,
        Self::MouthSmileRight,
        Self::MouthFrownLeft,
        Self::MouthFrownRight,
        Self::MouthDimpleLeft,
        Self::MouthDimpleRight,
        Self::MouthUpperUpLeft,
        Self::MouthUpperUpRight,
        Self::MouthLowerDownLeft,
        Self::MouthLowerDownRight,
        Self::MouthPressLeft,
        Self::MouthPressRight,
        Self::MouthStretchLeft,
        Self::MouthStretchRight,
        Self::TongueOut,
        Self::TongueUp,
        Self::TongueDown,
        Self::TongueLeft,
        Self::TongueRight,
        Self::TongueRoll,
        Self::TongueBendDown,
        Self::TongueCurlUp,
        Self::TongueSquish,
        Self::TongueFlat,
        Self::TongueTwistLeft,
        Self::TongueTwistRight,
    ];

    pub fn name(self) -> String {
        format!("{:?}", self)
    }

    /// Wire address: the channel name with a lower-cased first letter, e.g. `/jawOpen`.
    pub fn address(self) -> String {
        let name = self.name();
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => format!("/{}{}", first.to_ascii_lowercase(), chars.as_str()),
            None => "/".to_string(),
        }
    }
}

impl TryFrom<usize> for FaceExpressions {
    type Error = ();

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::ALL.get(value).copied().ok_or(())
    }
}
