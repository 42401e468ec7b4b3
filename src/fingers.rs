use crate::{
    error::Result,
    geometry::check_count,
    types::{Landmark, TIP_IDS},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    pub fn tip_id(&self) -> usize {
        TIP_IDS[*self as usize]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Finger::Thumb => "thumb",
            Finger::Index => "index",
            Finger::Middle => "middle",
            Finger::Ring => "ring",
            Finger::Pinky => "pinky",
        }
    }
}

/// Up/down state per finger, ordered thumb to pinky.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FingerStates(pub [bool; 5]);

impl FingerStates {
    pub fn get(&self, finger: Finger) -> bool {
        self.0[finger as usize]
    }

    /// `1` for up, `0` for down.
    pub fn as_bits(&self) -> [u8; 5] {
        self.0.map(u8::from)
    }

    pub fn count_up(&self) -> usize {
        self.0.iter().filter(|up| **up).count()
    }
}

/// Classifies each finger of one pixel-space hand as up or down.
///
/// The thumb counts as up when its tip lies to the right of the joint below
/// it. That only holds for one hand orientation relative to the camera; a
/// mirrored hand reads inverted. The other fingers are up when the tip sits
/// higher on screen (smaller `y`) than the joint two steps down the chain.
pub fn fingers_up(landmarks: &[Landmark]) -> Result<FingerStates> {
    check_count(landmarks.len())?;

    let mut states = [false; 5];
    let thumb_tip = Finger::Thumb.tip_id();
    states[0] = landmarks[thumb_tip].x > landmarks[thumb_tip - 1].x;

    for finger in &Finger::ALL[1..] {
        let tip = finger.tip_id();
        states[*finger as usize] = landmarks[tip].y < landmarks[tip - 2].y;
    }

    Ok(FingerStates(states))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::HandError, types::NUM_LANDMARKS};

    // Every finger folded: tips below their joints, thumb tip left of its joint.
    fn folded_hand() -> Vec<Landmark> {
        (0..NUM_LANDMARKS)
            .map(|id| Landmark::new(id, 300, 300))
            .map(|mut lm| {
                if TIP_IDS.contains(&lm.id) {
                    lm.y = 350;
                }
                if lm.id == 4 {
                    lm.x = 250;
                }
                lm
            })
            .collect()
    }

    #[test]
    fn index_tip_above_joint_is_up() {
        let mut hand = folded_hand();
        hand[8].y = 50;
        hand[6].y = 100;
        let states = fingers_up(&hand).unwrap();
        assert!(states.get(Finger::Index));
        assert_eq!(states.as_bits(), [0, 1, 0, 0, 0]);
    }

    #[test]
    fn index_tip_below_joint_is_down() {
        let mut hand = folded_hand();
        hand[8].y = 150;
        hand[6].y = 100;
        assert!(!fingers_up(&hand).unwrap().get(Finger::Index));
    }

    #[test]
    fn thumb_follows_x_ordering() {
        let mut hand = folded_hand();
        hand[4].x = 200;
        hand[3].x = 150;
        assert!(fingers_up(&hand).unwrap().get(Finger::Thumb));

        hand[4].x = 150;
        hand[3].x = 200;
        assert!(!fingers_up(&hand).unwrap().get(Finger::Thumb));
    }

    #[test]
    fn equal_coordinates_count_as_down() {
        let hand: Vec<Landmark> = (0..NUM_LANDMARKS)
            .map(|id| Landmark::new(id, 10, 10))
            .collect();
        assert_eq!(fingers_up(&hand).unwrap(), FingerStates([false; 5]));
    }

    #[test]
    fn open_hand_reports_five() {
        let mut hand = folded_hand();
        hand[4].x = 400;
        for tip in &TIP_IDS[1..] {
            hand[*tip].y = 100;
        }
        let states = fingers_up(&hand).unwrap();
        assert_eq!(states.as_bits(), [1, 1, 1, 1, 1]);
        assert_eq!(states.count_up(), 5);
    }

    #[test]
    fn always_five_binary_values() {
        for seed in 0..32i32 {
            let hand: Vec<Landmark> = (0..NUM_LANDMARKS)
                .map(|id| {
                    let v = (id as i32 * 31 + seed * 17) % 97;
                    Landmark::new(id, v, 97 - v)
                })
                .collect();
            let bits = fingers_up(&hand).unwrap().as_bits();
            assert_eq!(bits.len(), 5);
            assert!(bits.iter().all(|b| *b == 0 || *b == 1));
        }
    }

    #[test]
    fn wrong_landmark_count_is_rejected() {
        let hand = folded_hand();
        assert!(matches!(
            fingers_up(&hand[..20]),
            Err(HandError::InvalidInput(_))
        ));
        assert!(fingers_up(&[]).is_err());
    }
}
